use serde_json::Value;

/// Masks donor identity and credentials in JSON payloads before they are logged.
pub fn sanitize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sanitized = serde_json::Map::new();
            for (key, val) in map {
                let sanitized_val = if is_sensitive_field(key) {
                    mask_value(val)
                } else {
                    sanitize_json(val)
                };
                sanitized.insert(key.clone(), sanitized_val);
            }
            Value::Object(sanitized)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sanitize_json).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_field(key: &str) -> bool {
    matches!(
        key.to_lowercase().as_str(),
        "first_name"
            | "last_name"
            | "email"
            | "phone"
            | "address"
            | "password"
            | "secret"
            | "token"
            | "api_key"
            | "authorization"
    )
}

fn mask_value(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(s) if s.chars().count() > 8 => {
            let visible: String = s.chars().take(2).collect();
            Value::String(format!("{}****", visible))
        }
        _ => Value::String("****".to_string()),
    }
}
