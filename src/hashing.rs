//! Hashing of gate and config names into snapshot lookup keys.

/// Turns a human-readable gate/config name into the key used by the snapshot.
pub trait KeyHasher {
    /// Hash `name` into a snapshot key.
    fn hash(&self, name: &str) -> String;
}

/// The default hasher: lowercase hex-encoded md5 digest of the name.
pub struct Md5KeyHasher;

impl KeyHasher for Md5KeyHasher {
    fn hash(&self, name: &str) -> String {
        format!("{:x}", md5::compute(name))
    }
}

/// Uses names as-is. Useful for servers that do not obfuscate snapshot keys.
pub struct PlainKeyHasher;

impl KeyHasher for PlainKeyHasher {
    fn hash(&self, name: &str) -> String {
        name.to_owned()
    }
}
