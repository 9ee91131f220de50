use super::*;

#[test]
fn schema_record_structure() {
    let record = SchemaRecord::new("actor", vec![0.1, 0.2, 0.3], "CREATE TABLE actor (actor_id INTEGER)");

    assert_eq!(record.id, "actor");
    assert_eq!(record.vector.len(), 3);
    assert_eq!(record.content, "CREATE TABLE actor (actor_id INTEGER)");
    assert!(
        chrono::DateTime::parse_from_rfc3339(&record.created_at).is_ok(),
        "created_at should be RFC 3339: {}",
        record.created_at
    );
}

#[test]
fn schema_record_serialization() {
    let record = SchemaRecord {
        id: "film".to_string(),
        vector: vec![0.5],
        content: "CREATE TABLE film (film_id INTEGER)".to_string(),
        created_at: "2024-01-01T00:00:00+00:00".to_string(),
    };

    let json = serde_json::to_string(&record).expect("should serialize record");
    assert!(json.contains("\"id\":\"film\""));

    let decoded: SchemaRecord = serde_json::from_str(&json).expect("should deserialize record");
    assert_eq!(decoded, record);
}
