use serde_json::{Map, Value};

/// Returns a copy of `value` with the named fields either kept (`exclude =
/// false`) or stripped (`exclude = true`). Fields may address nested objects
/// with dot-separated paths (`"settings.locale"`). Non-object values are
/// returned unchanged.
pub fn project(value: &Value, fields: &[&str], exclude: bool) -> Value {
    let Some(obj) = value.as_object() else {
        return value.clone();
    };

    if exclude {
        let mut out = obj.clone();
        for field in fields {
            remove_path(&mut out, field);
        }
        Value::Object(out)
    } else {
        let mut out = Map::new();
        for field in fields {
            copy_path(obj, &mut out, field);
        }
        Value::Object(out)
    }
}

fn remove_path(obj: &mut Map<String, Value>, path: &str) {
    match path.split_once('.') {
        None => {
            obj.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(inner)) = obj.get_mut(head) {
                remove_path(inner, rest);
            }
        }
    }
}

fn copy_path(src: &Map<String, Value>, dst: &mut Map<String, Value>, path: &str) {
    match path.split_once('.') {
        None => {
            if let Some(v) = src.get(path) {
                dst.insert(path.to_string(), v.clone());
            }
        }
        Some((head, rest)) => {
            if let Some(Value::Object(inner)) = src.get(head) {
                let slot = dst
                    .entry(head.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(slot) = slot {
                    copy_path(inner, slot, rest);
                }
            }
        }
    }
}
