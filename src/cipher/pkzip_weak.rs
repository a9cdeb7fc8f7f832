//! Traditional PKZIP ("ZipCrypto") stream cipher.
//!
//! Three 32-bit keys are derived from the password, then updated one
//! plaintext byte at a time as per the PKZIP APPNOTE algorithm. The
//! 12-byte encryption header lets the reader verify a password without
//! decrypting the full entry: byte 11 is checked against either the high
//! byte of the entry's CRC32, or (the "strong header" variant, used when
//! GP-bit 3 / a trailing data descriptor is in play) the high byte of the
//! DOS last-mod-time.

use std::io::{self, Read, Write};
use std::sync::OnceLock;

use crate::error::{Result, ZipError};

/// Which byte the final header byte is checked against on decrypt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckByte {
    /// High byte of the entry's CRC32 (used when the CRC is known up front).
    Crc(u32),
    /// High byte of the DOS last-mod-time (used when GP-bit 3 is set and
    /// the CRC is not yet known at header-write time).
    Time(u16),
}

impl CheckByte {
    fn byte(self) -> u8 {
        match self {
            CheckByte::Crc(crc) => (crc >> 24) as u8,
            CheckByte::Time(time) => (time >> 8) as u8,
        }
    }
}

fn crc_table() -> &'static [u32; 256] {
    static TABLE: OnceLock<[u32; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0u32; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            let mut c = i as u32;
            for _ in 0..8 {
                c = if c & 1 != 0 {
                    0xEDB8_8320 ^ (c >> 1)
                } else {
                    c >> 1
                };
            }
            *slot = c;
        }
        table
    })
}

fn crc32_update(crc: u32, byte: u8) -> u32 {
    let table = crc_table();
    (crc >> 8) ^ table[((crc ^ byte as u32) & 0xff) as usize]
}

/// The three rolling keys that drive the keystream.
#[derive(Clone)]
struct Keys {
    key0: u32,
    key1: u32,
    key2: u32,
}

impl Keys {
    fn new(password: &[u8]) -> Self {
        let mut keys = Self {
            key0: 0x1234_5678,
            key1: 0x2345_6789,
            key2: 0x3456_7890,
        };
        for &b in password {
            keys.update(b);
        }
        keys
    }

    fn update(&mut self, plain_byte: u8) {
        self.key0 = crc32_update(self.key0, plain_byte);
        self.key1 = self
            .key1
            .wrapping_add(self.key0 & 0xff)
            .wrapping_mul(134_775_813)
            .wrapping_add(1);
        self.key2 = crc32_update(self.key2, (self.key1 >> 24) as u8);
    }

    fn keystream_byte(&self) -> u8 {
        let temp = (self.key2 | 2) as u16 as u32;
        ((temp.wrapping_mul(temp ^ 1)) >> 8) as u8
    }

    fn encrypt_byte(&mut self, plain: u8) -> u8 {
        let ks = self.keystream_byte();
        self.update(plain);
        plain ^ ks
    }

    fn decrypt_byte(&mut self, cipher: u8) -> u8 {
        let ks = self.keystream_byte();
        let plain = cipher ^ ks;
        self.update(plain);
        plain
    }
}

/// Generates the 11 random bytes of the encryption header.
fn random_header_bytes() -> Result<[u8; 11]> {
    let mut buf = [0u8; 11];
    getrandom::getrandom(&mut buf)
        .map_err(|e| ZipError::corrupt(format!("random number generation failed: {e}")))?;
    Ok(buf)
}

/// Encrypts a stream with the traditional PKZIP cipher, writing the
/// 12-byte header eagerly on construction.
pub struct PkzipWeakEncryptor<W: Write> {
    inner: W,
    keys: Keys,
}

impl<W: Write> PkzipWeakEncryptor<W> {
    pub fn new(mut inner: W, password: &str, check: CheckByte) -> Result<Self> {
        let mut keys = Keys::new(password.as_bytes());
        let mut header = [0u8; 12];
        header[..11].copy_from_slice(&random_header_bytes()?);
        header[11] = check.byte();
        for b in header.iter_mut() {
            *b = keys.encrypt_byte(*b);
        }
        inner.write_all(&header)?;
        Ok(Self { inner, keys })
    }
}

impl<W: Write> Write for PkzipWeakEncryptor<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = Vec::with_capacity(buf.len());
        for &b in buf {
            out.push(self.keys.encrypt_byte(b));
        }
        self.inner.write_all(&out)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Decrypts a stream with the traditional PKZIP cipher. The 12-byte
/// header must be read (via [`PkzipWeakDecryptor::new`]) before any entry
/// bytes are decrypted.
pub struct PkzipWeakDecryptor<R: Read> {
    inner: R,
    keys: Keys,
}

impl<R: Read> PkzipWeakDecryptor<R> {
    /// Reads and verifies the 12-byte encryption header.
    pub fn new(mut inner: R, password: &str, check: CheckByte) -> Result<Self> {
        let mut keys = Keys::new(password.as_bytes());
        let mut header = [0u8; 12];
        inner.read_exact(&mut header)?;
        for b in header.iter_mut() {
            *b = keys.decrypt_byte(*b);
        }
        if header[11] != check.byte() {
            return Err(ZipError::BadPassword);
        }
        Ok(Self { inner, keys })
    }

    /// Verifies the password without constructing a usable decryptor,
    /// consuming the header from `inner` either way.
    pub fn check_password(mut inner: R, password: &str, check: CheckByte) -> Result<bool> {
        let mut keys = Keys::new(password.as_bytes());
        let mut header = [0u8; 12];
        inner.read_exact(&mut header)?;
        for b in header.iter_mut() {
            *b = keys.decrypt_byte(*b);
        }
        Ok(header[11] == check.byte())
    }
}

impl<R: Read> Read for PkzipWeakDecryptor<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        for b in buf[..n].iter_mut() {
            *b = self.keys.decrypt_byte(*b);
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let plaintext = b"traditional pkzip stream cipher round trip test";
        let crc = crc32fast::hash(plaintext);

        let mut encrypted = Vec::new();
        {
            let mut enc =
                PkzipWeakEncryptor::new(&mut encrypted, "hunter2", CheckByte::Crc(crc)).unwrap();
            enc.write_all(plaintext).unwrap();
        }
        assert_ne!(&encrypted[12..], &plaintext[..]);

        let mut dec =
            PkzipWeakDecryptor::new(&encrypted[..], "hunter2", CheckByte::Crc(crc)).unwrap();
        let mut out = Vec::new();
        dec.read_to_end(&mut out).unwrap();
        assert_eq!(out, plaintext);
    }

    #[test]
    fn wrong_password_is_rejected() {
        let plaintext = b"secret";
        let crc = crc32fast::hash(plaintext);
        let mut encrypted = Vec::new();
        {
            let mut enc =
                PkzipWeakEncryptor::new(&mut encrypted, "right", CheckByte::Crc(crc)).unwrap();
            enc.write_all(plaintext).unwrap();
        }
        let err = PkzipWeakDecryptor::new(&encrypted[..], "wrong", CheckByte::Crc(crc))
            .err()
            .unwrap();
        assert!(matches!(err, ZipError::BadPassword));
    }
}
