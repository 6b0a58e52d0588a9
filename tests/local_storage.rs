use damage_check::{
    backend::{Storage, local::LocalStorage},
    error::StorageError,
};

fn storage() -> (tempfile::TempDir, LocalStorage) {
    let dir = tempfile::tempdir().expect("tempdir");
    let s = LocalStorage::new(dir.path());
    (dir, s)
}

#[test]
fn put_then_list_and_get() {
    let (_dir, s) = storage();
    s.put_bytes("bucket", "damage_images/home.jpg", b"jpeg", "image/jpeg")
        .unwrap();
    s.put_bytes("bucket", "a.png", b"png", "image/png").unwrap();

    let keys = s.list_keys("bucket").unwrap();
    assert_eq!(keys, vec!["a.png", "damage_images/home.jpg"]);
    assert_eq!(s.get_bytes("bucket", "damage_images/home.jpg").unwrap(), b"jpeg");
}

#[test]
fn missing_object_is_not_found() {
    let (_dir, s) = storage();
    s.put_bytes("bucket", "x.jpg", b"1", "image/jpeg").unwrap();
    let err = s.get_bytes("bucket", "y.jpg").unwrap_err();
    assert!(matches!(err, StorageError::NotFound { ref key, .. } if key == "y.jpg"));
}

#[test]
fn missing_bucket_fails_listing() {
    let (_dir, s) = storage();
    assert!(matches!(
        s.list_keys("nope"),
        Err(StorageError::NotFound { .. })
    ));
}

#[test]
fn traversal_keys_are_rejected() {
    let (_dir, s) = storage();
    for key in ["../escape.jpg", "/etc/passwd", "a/../../b.jpg", ""] {
        let err = s.put_bytes("bucket", key, b"x", "text/plain").unwrap_err();
        assert!(matches!(err, StorageError::AccessDenied(_)), "{key}");
    }
    assert!(matches!(
        s.list_keys(".."),
        Err(StorageError::AccessDenied(_))
    ));
}
