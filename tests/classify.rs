use damage_check::classify::{DamageClassifier, DamageKeywordSet, DamageLabel, classify};

fn l(name: &str, confidence: f32) -> DamageLabel {
    DamageLabel::new(name, confidence)
}

#[test]
fn keeps_rust_and_dent_drops_car() {
    let labels = vec![l("Rust", 91.2), l("Car", 85.0), l("Dented Door", 77.5)];
    let out = classify(&labels);
    assert_eq!(out, vec![l("Rust", 91.2), l("Dented Door", 77.5)]);
}

#[test]
fn empty_and_no_match_yield_empty() {
    assert!(classify(&[]).is_empty());
    let labels = vec![l("Car", 99.0), l("Tree", 80.0), l("Sky", 75.0)];
    assert!(classify(&labels).is_empty());
}

#[test]
fn preserves_order_and_duplicates() {
    let labels = vec![
        l("Scratch", 90.0),
        l("Person", 88.0),
        l("Scratch", 90.0),
        l("Broken Glass", 72.0),
        l("Road", 71.0),
    ];
    let out = classify(&labels);
    let names: Vec<&str> = out.iter().map(|x| x.name.as_str()).collect();
    assert_eq!(names, vec!["Scratch", "Scratch", "Broken Glass"]);
}

#[test]
fn result_is_subsequence_and_partition_is_exact() {
    let set = DamageKeywordSet::default();
    let labels = vec![
        l("Corrosion", 95.0),
        l("Building", 90.0),
        l("Car Collision", 80.0),
        l("Window", 79.0),
        l("Peeling paint", 74.0),
    ];
    let out = classify(&labels);

    let mut it = labels.iter();
    for kept in &out {
        assert!(it.any(|x| x == kept), "not a subsequence: {kept:?}");
    }
    for label in &labels {
        assert_eq!(out.contains(label), set.matches(&label.name), "{}", label.name);
    }
}

#[test]
fn idempotent() {
    let labels = vec![l("Wear", 80.0), l("Dog", 99.0), l("Fracture", 70.0)];
    let once = classify(&labels);
    assert_eq!(classify(&once), once);
}

#[test]
fn matching_is_case_folded_substring() {
    let set = DamageKeywordSet::default();
    assert_eq!(set.matching_keyword("RUSTY METAL"), Some("rust"));
    // accepted imprecision: plain substring containment
    assert!(set.matches("Trust"));
    assert!(set.matches("Stressed Concrete"));
    assert!(!set.matches("Automobile"));
}

#[test]
fn builtin_vocabulary_is_fixed_and_lowercase() {
    let set = DamageKeywordSet::default();
    assert_eq!(set.len(), 48);
    assert_eq!(set.keywords().first().map(String::as_str), Some("damage"));
    assert!(set.keywords().iter().all(|k| k == &k.to_lowercase()));
}

#[test]
fn extra_keywords_are_normalized_and_appended() {
    let set = DamageKeywordSet::with_extra(&["  Hail ", "RUST", ""]);
    assert_eq!(set.len(), 49);
    assert_eq!(set.keywords().last().map(String::as_str), Some("hail"));

    let classifier = DamageClassifier::new(set);
    let out = classifier.classify(&[l("Hailstorm", 88.0), l("Car", 90.0)]);
    assert_eq!(out, vec![l("Hailstorm", 88.0)]);
}
