use damage_check::{
    classify::DamageLabel,
    config::Generation,
    error::ServiceError,
    prompt::{ModelRequest, report_prompt, response_text},
};

#[test]
fn prompt_embeds_labels_and_asks() {
    let p = report_prompt(&[DamageLabel::new("Crack", 81.5)]);
    assert!(p.starts_with("Analyze the following image for damage."));
    assert!(p.contains(r#"[{"name":"Crack","confidence":81.5}]"#));
    assert!(p.contains("3. Potential repair cost range"));
    assert!(p.ends_with("Be specific and use the detected labels as context."));
}

#[test]
fn request_body_matches_messages_format() {
    let req = ModelRequest::for_report(&Generation::default(), b"abc", &[]);
    let v = serde_json::to_value(&req).unwrap();

    assert_eq!(v["anthropic_version"], "bedrock-2023-05-31");
    assert_eq!(v["max_tokens"], 300);
    assert_eq!(v["messages"][0]["role"], "user");

    let parts = &v["messages"][0]["content"];
    assert_eq!(parts[0]["type"], "image");
    assert_eq!(parts[0]["source"]["type"], "base64");
    assert_eq!(parts[0]["source"]["media_type"], "image/jpeg");
    assert_eq!(parts[0]["source"]["data"], "YWJj");
    assert_eq!(parts[1]["type"], "text");
    assert!(parts[1]["text"].as_str().unwrap().contains("indicators: []"));
}

#[test]
fn response_text_reads_first_content_block() {
    let body = serde_json::json!({"content": [{"type": "text", "text": "Minor dent."}]});
    assert_eq!(response_text(&body).unwrap(), "Minor dent.");

    let empty = serde_json::json!({"content": []});
    assert!(matches!(response_text(&empty), Err(ServiceError::Protocol(_))));
}
