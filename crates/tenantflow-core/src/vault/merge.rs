use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::CoreError;

/// Decrypted vault contents: node id to secret fields
pub type CredentialMap = BTreeMap<String, Map<String, Value>>;

/// Interpret a JSON document as a credential map
pub fn decode_credential_map(value: Value) -> Result<CredentialMap, CoreError> {
    let Value::Object(nodes) = value else {
        return Err(CoreError::CorruptVault(
            "credential plaintext is not an object".to_string(),
        ));
    };

    nodes
        .into_iter()
        .map(|(node_id, fields)| match fields {
            Value::Object(fields) => Ok((node_id, fields)),
            _ => Err(CoreError::CorruptVault(format!(
                "credentials for node `{}` are not an object",
                node_id
            ))),
        })
        .collect()
}

/// Field-level merge of `incoming` into `current`
///
/// Unknown node ids are inserted whole. For known ids only the named fields
/// are overwritten; everything else in `current` is kept.
pub fn merge_credentials(mut current: CredentialMap, incoming: CredentialMap) -> CredentialMap {
    for (node_id, fields) in incoming {
        current.entry(node_id).or_default().extend(fields);
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn map(value: Value) -> CredentialMap {
        decode_credential_map(value).unwrap()
    }

    #[test]
    fn test_merge_inserts_new_nodes() {
        let merged = merge_credentials(
            map(json!({"n1": {"pw": "a"}})),
            map(json!({"n2": {"pw": "b"}})),
        );
        assert_eq!(merged, map(json!({"n1": {"pw": "a"}, "n2": {"pw": "b"}})));
    }

    #[test]
    fn test_merge_overwrites_only_named_fields() {
        let merged = merge_credentials(
            map(json!({"n1": {"user": "u", "pw": "old"}, "n9": {"token": "t"}})),
            map(json!({"n1": {"pw": "new", "extra": 1}})),
        );
        assert_eq!(
            merged,
            map(json!({
                "n1": {"user": "u", "pw": "new", "extra": 1},
                "n9": {"token": "t"}
            }))
        );
    }

    #[test]
    fn test_merge_with_empty_is_identity() {
        let current = map(json!({"n1": {"pw": "a"}}));
        assert_eq!(merge_credentials(current.clone(), CredentialMap::new()), current);
        assert_eq!(merge_credentials(CredentialMap::new(), current.clone()), current);
    }

    #[test]
    fn test_decode_rejects_non_object_nodes() {
        assert!(matches!(
            decode_credential_map(json!({"n1": "flat"})),
            Err(CoreError::CorruptVault(_))
        ));
        assert!(matches!(
            decode_credential_map(json!("text")),
            Err(CoreError::CorruptVault(_))
        ));
    }
}
