pub struct Fnv64 {
    hash: u64,
}

impl Fnv64 {
    pub fn new() -> Self {
        Self {
            hash: 0xcbf29ce484222325,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        let mut h = self.hash;
        for &b in data {
            h ^= b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        self.hash = h;
    }

    pub fn update_u64(&mut self, v: u64) {
        self.update(&v.to_le_bytes());
    }

    pub fn update_str(&mut self, s: &str) {
        self.update_u64(s.len() as u64);
        self.update(s.as_bytes());
    }

    pub fn finish(&self) -> u64 {
        self.hash
    }
}

impl Default for Fnv64 {
    fn default() -> Self {
        Self::new()
    }
}

pub fn hash_bytes(data: &[u8]) -> u64 {
    let mut hasher = Fnv64::new();
    hasher.update(data);
    hasher.finish()
}
