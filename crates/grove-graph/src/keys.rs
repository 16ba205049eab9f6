//! Byte encodings for the store's index trees.
//!
//! Every string component is written as a big-endian u32 length followed by
//! its bytes, so encodings are prefix-free: the prefix for one identity can
//! never be a prefix of another identity's key. Optional components carry a
//! tag byte so that an absent method name is distinct from every present one,
//! including the empty string. Ids are appended as 8 big-endian bytes, which
//! keeps entries under one prefix ordered by id.

use grove_core::{IdentityKey, NodeId};

const ABSENT: u8 = 0;
const PRESENT: u8 = 1;

fn push_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn push_opt(buf: &mut Vec<u8>, s: Option<&str>) {
    match s {
        Some(s) => {
            buf.push(PRESENT);
            push_str(buf, s);
        }
        None => buf.push(ABSENT),
    }
}

pub(crate) fn id_bytes(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

/// Reads the trailing 8-byte id of an index key.
pub(crate) fn trailing_id(key: &[u8]) -> Option<u64> {
    let start = key.len().checked_sub(8)?;
    let bytes: [u8; 8] = key[start..].try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

/// Reads an 8-byte id value.
pub(crate) fn id_value(value: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = value.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

pub(crate) fn with_id(mut prefix: Vec<u8>, id: u64) -> Vec<u8> {
    prefix.extend_from_slice(&id_bytes(id));
    prefix
}

pub(crate) fn project_prefix(project_id: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + project_id.len());
    push_str(&mut buf, project_id);
    buf
}

pub(crate) fn branch_prefix(project_id: &str, branch: &str) -> Vec<u8> {
    let mut buf = project_prefix(project_id);
    push_str(&mut buf, branch);
    buf
}

pub(crate) fn identity_prefix(project_id: &str, branch: &str, identity: &IdentityKey) -> Vec<u8> {
    let mut buf = branch_prefix(project_id, branch);
    push_str(&mut buf, &identity.class_name);
    push_opt(&mut buf, identity.method_name.as_deref());
    buf
}

pub(crate) fn method_prefix(project_id: &str, branch: &str, method_name: &str) -> Vec<u8> {
    let mut buf = branch_prefix(project_id, branch);
    push_str(&mut buf, method_name);
    buf
}

/// Decodes the string component starting at `offset` (the branch, when
/// `offset` is the length of a project prefix).
pub(crate) fn branch_of(key: &[u8], offset: usize) -> Option<String> {
    let len_bytes: [u8; 4] = key.get(offset..offset + 4)?.try_into().ok()?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    let bytes = key.get(offset + 4..offset + 4 + len)?;
    String::from_utf8(bytes.to_vec()).ok()
}

pub(crate) fn adjacency_key(node: NodeId, edge: u64) -> Vec<u8> {
    with_id(id_bytes(node.0).to_vec(), edge)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_prefix_does_not_cover_methods() {
        let class = identity_prefix("1", "main", &IdentityKey::class("Foo"));
        let method = identity_prefix("1", "main", &IdentityKey::method("Foo", "bar()"));
        let empty_method = identity_prefix("1", "main", &IdentityKey::method("Foo", ""));

        assert!(!method.starts_with(&class));
        assert!(!empty_method.starts_with(&class));
        assert_ne!(class, empty_method);
    }

    #[test]
    fn test_branch_prefix_is_prefix_free() {
        let main = branch_prefix("1", "main");
        let main2 = branch_prefix("1", "main2");
        assert!(!main2.starts_with(&main));
    }

    #[test]
    fn test_trailing_id_roundtrip() {
        let key = with_id(branch_prefix("1", "dev"), 42);
        assert_eq!(trailing_id(&key), Some(42));
        assert_eq!(trailing_id(&[1, 2]), None);
    }

    #[test]
    fn test_branch_of() {
        let key = with_id(branch_prefix("proj", "feature/x"), 7);
        let offset = project_prefix("proj").len();
        assert_eq!(branch_of(&key, offset).as_deref(), Some("feature/x"));
    }
}
