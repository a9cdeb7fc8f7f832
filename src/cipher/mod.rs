//! Streaming encrypt/decrypt layer: traditional PKZIP encryption and
//! WinZip AES-128/256 (AE-2).

pub mod aes;
pub mod pkzip_weak;

/// Which cipher, if any, an entry is encrypted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionKind {
    None,
    PkzipWeak,
    WinzipAes128,
    WinzipAes256,
}

impl EncryptionKind {
    pub fn is_aes(self) -> bool {
        matches!(self, EncryptionKind::WinzipAes128 | EncryptionKind::WinzipAes256)
    }
}
