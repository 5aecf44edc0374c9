//! Navigation of JSON payloads by key segments, and their sealed form at rest.
//!
//! Object members are addressed by name, array elements by decimal index.
//! [`ANY_SEGMENT`] matches every member of an object or array where a
//! wildcard is accepted.

use bytes::Bytes;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::Error;
use crate::principal::Principal;
use crate::schema::ANY_SEGMENT;
use crate::storage::{StorageError, StorageProvider};
use crate::transaction::StorageResource;
use crate::vault::KeyVault;

fn describe(path: &[String]) -> String {
    path.join("/")
}

fn index(segment: &str, len: usize) -> Option<usize> {
    segment.parse::<usize>().ok().filter(|i| *i < len)
}

/// The value at `path` below `value`
pub fn select<'a>(value: &'a Value, path: &[String]) -> Result<&'a Value, Error> {
    let mut current = value;
    for (depth, segment) in path.iter().enumerate() {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => index(segment, items.len()).map(|i| &items[i]),
            _ => return Err(Error::NotSelectable(describe(&path[..=depth]))),
        };
        current = next.ok_or_else(|| Error::NotFound(describe(&path[..=depth])))?;
    }
    Ok(current)
}

/// Put `new` at `path` below `value`, creating intermediate objects
pub fn insert(value: &mut Value, path: &[String], new: Value) -> Result<(), Error> {
    let Some((last, parents)) = path.split_last() else {
        *value = new;
        return Ok(());
    };

    let mut current = value;
    for (depth, segment) in parents.iter().enumerate() {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(map) => map
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new())),
            Value::Array(items) => {
                let i = index(segment, items.len())
                    .ok_or_else(|| Error::NotFound(describe(&path[..=depth])))?;
                &mut items[i]
            }
            _ => return Err(Error::NotSelectable(describe(&path[..=depth]))),
        };
    }

    if current.is_null() {
        *current = Value::Object(Map::new());
    }
    match current {
        Value::Object(map) => {
            map.insert(last.clone(), new);
        }
        Value::Array(items) => match last.parse::<usize>() {
            Ok(i) if i < items.len() => items[i] = new,
            Ok(i) if i == items.len() => items.push(new),
            _ => return Err(Error::NotFound(describe(path))),
        },
        _ => return Err(Error::NotSelectable(describe(path))),
    }
    Ok(())
}

/// Remove and return the value at `path`; an empty path takes the whole value
pub fn take(value: &mut Value, path: &[String]) -> Result<Value, Error> {
    let Some((last, parents)) = path.split_last() else {
        return Ok(std::mem::take(value));
    };

    let mut current = value;
    for (depth, segment) in parents.iter().enumerate() {
        let next = match current {
            Value::Object(map) => map.get_mut(segment),
            Value::Array(items) => {
                let len = items.len();
                index(segment, len).map(move |i| &mut items[i])
            }
            _ => return Err(Error::NotSelectable(describe(&path[..=depth]))),
        };
        current = next.ok_or_else(|| Error::NotFound(describe(&path[..=depth])))?;
    }

    let removed = match current {
        Value::Object(map) => map.remove(last),
        Value::Array(items) => index(last, items.len()).map(|i| items.remove(i)),
        _ => return Err(Error::NotSelectable(describe(path))),
    };
    removed.ok_or_else(|| Error::NotFound(describe(path)))
}

/// Call `f` on every value matching `path`, where `*` matches any member.
/// Paths that do not exist are skipped.
pub fn for_each_at(value: &mut Value, path: &[String], f: &mut dyn FnMut(&mut Value)) {
    let Some((segment, rest)) = path.split_first() else {
        f(value);
        return;
    };
    match value {
        Value::Object(map) if segment == ANY_SEGMENT => {
            for child in map.values_mut() {
                for_each_at(child, rest, f);
            }
        }
        Value::Object(map) => {
            if let Some(child) = map.get_mut(segment) {
                for_each_at(child, rest, f);
            }
        }
        Value::Array(items) if segment == ANY_SEGMENT => {
            for child in items.iter_mut() {
                for_each_at(child, rest, f);
            }
        }
        Value::Array(items) => {
            let len = items.len();
            if let Some(i) = index(segment, len) {
                for_each_at(&mut items[i], rest, f);
            }
        }
        _ => {}
    }
}

/// Encrypt `value` for `node` under its current storage key
pub fn seal(
    vault: &KeyVault,
    node: Uuid,
    principal: &Principal,
    value: &Value,
) -> Result<Bytes, Error> {
    let plain = serde_json::to_vec(value)?;
    Ok(Bytes::from(vault.encrypt_data(node, principal, &plain)?))
}

/// Decrypt bytes produced by [`seal`] as `principal`
pub fn open(vault: &KeyVault, node: Uuid, principal: &Principal, data: &[u8]) -> Result<Value, Error> {
    let plain = vault.decrypt_data(node, principal, data)?;
    Ok(serde_json::from_slice(&plain)?)
}

/// Load and decrypt the payload of `node`, seeing writes pending in
/// `pending` first. `None` if nothing was ever stored.
pub async fn load(
    storage: &dyn StorageProvider,
    pending: Option<&StorageResource>,
    vault: &KeyVault,
    node: Uuid,
    principal: &Principal,
) -> Result<Option<Value>, Error> {
    let loaded = match pending {
        Some(resource) => resource.load(node).await,
        None => storage.load(node).await,
    };
    match loaded {
        Ok(data) => Ok(Some(open(vault, node, principal, &data)?)),
        Err(StorageError::NotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
