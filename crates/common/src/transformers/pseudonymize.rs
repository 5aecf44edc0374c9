use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;

use super::{sensitive_paths, tags};
use crate::consent::AccessMode;
use crate::error::Error;
use crate::key::Fork;
use crate::payload;
use crate::schema::Sensitivity;
use crate::traits::{Phase, Trait, Transform, TransformState, TransformerSpec};

/// Transaction scratch entry holding the hex pseudonym key
const KEY_SCRATCH: &str = "pseudonym_key";
const PREFIX: &str = "pn-";
const PSEUDONYM_LEN: usize = 16;

/// Replaces identifying fields with keyed-hash pseudonyms on reads in
/// pseudonym mode. The key is drawn once per transaction, so equal values
/// get equal pseudonyms within a transaction and unlinkable ones across
/// transactions.
#[derive(Debug)]
pub struct Pseudonymize {
    spec: TransformerSpec,
}

impl Default for Pseudonymize {
    fn default() -> Self {
        Self {
            spec: TransformerSpec::new(tags::PSEUDONYMIZE, Phase::PostLoad)
                .supports([AccessMode::Pseudonym])
                .only_modes([AccessMode::Read])
                .only_forks([Fork::Data]),
        }
    }
}

fn pseudonym(key: &[u8; 32], value: &Value) -> Value {
    let input = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let hash = blake3::keyed_hash(key, input.as_bytes());
    Value::String(format!("{}{}", PREFIX, &hash.to_hex()[..PSEUDONYM_LEN]))
}

fn pseudonymize(value: &mut Value, key: &[u8; 32]) {
    match value {
        Value::Object(map) => map.values_mut().for_each(|v| pseudonymize(v, key)),
        Value::Array(items) => items.iter_mut().for_each(|v| pseudonymize(v, key)),
        Value::Null => {}
        leaf => *leaf = pseudonym(key, leaf),
    }
}

impl Pseudonymize {
    fn transaction_key(state: &mut TransformState<'_>) -> Result<[u8; 32], Error> {
        if let Some(Value::String(encoded)) = state.trx.scratch(KEY_SCRATCH) {
            let mut key = [0u8; 32];
            hex::decode_to_slice(encoded, &mut key)
                .map_err(|e| Error::Default(anyhow::anyhow!("bad pseudonym key: {}", e)))?;
            return Ok(key);
        }
        let key: [u8; 32] = rand::rng().random();
        state
            .trx
            .set_scratch(KEY_SCRATCH, Value::String(hex::encode(key)));
        Ok(key)
    }
}

#[async_trait]
impl Transform for Pseudonymize {
    fn spec(&self) -> &TransformerSpec {
        &self.spec
    }

    async fn apply(&self, _t: &Trait, state: &mut TransformState<'_>) -> Result<(), Error> {
        let schema = state
            .schema
            .clone()
            .ok_or_else(|| Error::NotFound(format!("schema for {}", state.access.key())))?;
        let paths = sensitive_paths(schema.as_ref(), &state.schema_remainder(), &[Sensitivity::Eid]);
        let key = Self::transaction_key(state)?;
        let Some(data) = state.data.as_mut() else {
            return Ok(());
        };

        for path in &paths {
            payload::for_each_at(data, path, &mut |v| pseudonymize(v, &key));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_pseudonyms_are_stable_per_key() {
        let key = [7u8; 32];
        let other = [8u8; 32];
        let a = pseudonym(&key, &json!("alice"));
        assert_eq!(a, pseudonym(&key, &json!("alice")));
        assert_ne!(a, pseudonym(&key, &json!("bob")));
        assert_ne!(a, pseudonym(&other, &json!("alice")));

        let s = a.as_str().unwrap();
        assert!(s.starts_with(PREFIX));
        assert_eq!(s.len(), PREFIX.len() + PSEUDONYM_LEN);
    }

    #[test]
    fn test_pseudonymize_nested() {
        let key = [1u8; 32];
        let mut value = json!({"ids": ["a", "a"], "n": 3});
        pseudonymize(&mut value, &key);
        assert_eq!(value["ids"][0], value["ids"][1]);
        assert!(value["n"].as_str().unwrap().starts_with(PREFIX));
    }
}
