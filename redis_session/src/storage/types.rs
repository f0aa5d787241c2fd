/// Data stored in the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheData {
    pub value: Vec<u8>,
}

impl From<Vec<u8>> for CacheData {
    fn from(value: Vec<u8>) -> Self {
        Self { value }
    }
}
