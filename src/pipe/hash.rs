use xxhash_rust::xxh3::Xxh3;

// Collisions between cache keys are catastrophic, so two independently
// seeded 64-bit streams are concatenated into a 128-bit fingerprint.
const SEED_A: u64 = 0x8b5a_d4a0_c7d8_e9f1;
const SEED_B: u64 = 0x9ae1_6a3b_2f90_404f;

/// 128-bit fingerprint identifying one piece output in the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Hash128 {
    /// High 64 bits (stream A).
    pub hi: u64,
    /// Low 64 bits (stream B).
    pub lo: u64,
}

impl Hash128 {
    /// The before-anything sentinel; never produced by hashing.
    pub const NONE: Hash128 = Hash128 {
        hi: u64::MAX,
        lo: u64::MAX,
    };
}

impl std::fmt::Display for Hash128 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}{:016x}", self.hi, self.lo)
    }
}

/// Dual-stream rolling hasher for piece fingerprints.
///
/// Every write feeds both streams so the halves stay independent but
/// observe identical input framing.
pub struct PieceHasher {
    a: Xxh3,
    b: Xxh3,
}

impl Default for PieceHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl PieceHasher {
    pub fn new() -> Self {
        Self {
            a: Xxh3::with_seed(SEED_A),
            b: Xxh3::with_seed(SEED_B),
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.a.update(bytes);
        self.b.update(bytes);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    pub fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.write_u32(v as u32);
    }

    pub fn write_f32(&mut self, v: f32) {
        self.write_u32(v.to_bits());
    }

    pub fn write_str(&mut self, s: &str) {
        self.write_u64(s.len() as u64);
        self.write_bytes(s.as_bytes());
    }

    /// Chain in an upstream fingerprint.
    pub fn write_hash(&mut self, h: Hash128) {
        self.write_u64(h.hi);
        self.write_u64(h.lo);
    }

    /// Canonical traversal of a JSON params blob: tagged values, object
    /// keys visited in sorted order so map ordering cannot leak in.
    pub fn write_json(&mut self, v: &serde_json::Value) {
        match v {
            serde_json::Value::Null => self.write_u8(0),
            serde_json::Value::Bool(x) => {
                self.write_u8(1);
                self.write_bool(*x);
            }
            serde_json::Value::Number(n) => {
                self.write_u8(2);
                self.write_str(&n.to_string());
            }
            serde_json::Value::String(s) => {
                self.write_u8(3);
                self.write_str(s);
            }
            serde_json::Value::Array(items) => {
                self.write_u8(4);
                self.write_u64(items.len() as u64);
                for item in items {
                    self.write_json(item);
                }
            }
            serde_json::Value::Object(map) => {
                self.write_u8(5);
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                self.write_u64(keys.len() as u64);
                for k in keys {
                    self.write_str(k);
                    self.write_json(&map[k]);
                }
            }
        }
    }

    pub fn finish(self) -> Hash128 {
        Hash128 {
            hi: self.a.digest(),
            lo: self.b.digest(),
        }
    }
}

/// Fingerprint a flat f32 buffer (mask contents, source pixels).
pub fn hash_f32_slice(data: &[f32]) -> Hash128 {
    let mut h = PieceHasher::new();
    h.write_u64(data.len() as u64);
    for v in data {
        h.write_f32(*v);
    }
    h.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_same_input() {
        let mut a = PieceHasher::new();
        let mut b = PieceHasher::new();
        for h in [&mut a, &mut b] {
            h.write_str("denoise");
            h.write_u32(3);
            h.write_bool(true);
        }
        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn halves_are_independent() {
        let mut h = PieceHasher::new();
        h.write_str("exposure");
        let out = h.finish();
        assert_ne!(out.hi, out.lo);
        assert_ne!(out, Hash128::NONE);
    }

    #[test]
    fn json_object_key_order_does_not_matter() {
        let a: serde_json::Value = serde_json::json!({"x": 1, "y": [1, 2], "z": "s"});
        let b: serde_json::Value =
            serde_json::from_str(r#"{"z": "s", "y": [1, 2], "x": 1}"#).unwrap();

        let mut ha = PieceHasher::new();
        ha.write_json(&a);
        let mut hb = PieceHasher::new();
        hb.write_json(&b);
        assert_eq!(ha.finish(), hb.finish());
    }

    #[test]
    fn json_value_changes_change_the_hash() {
        let mut ha = PieceHasher::new();
        ha.write_json(&serde_json::json!({"gain": 1.0}));
        let mut hb = PieceHasher::new();
        hb.write_json(&serde_json::json!({"gain": 1.5}));
        assert_ne!(ha.finish(), hb.finish());
    }

    #[test]
    fn slice_fingerprint_sees_length_and_content() {
        let a = hash_f32_slice(&[0.0, 1.0]);
        let b = hash_f32_slice(&[0.0, 1.0, 0.0]);
        let c = hash_f32_slice(&[0.0, 2.0]);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
