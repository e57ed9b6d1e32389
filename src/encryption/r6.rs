//! Algorithm 2.B (ISO 32000-2): the iterative password hash used to
//! authenticate and derive keys for encryption revision 6. Revision 5 uses a
//! single SHA-256 round of the same inputs; see [`hash`].

use aes::Aes128;
use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockEncryptMut, KeyIvInit};
use sha2::{Digest, Sha256, Sha384, Sha512};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;

/// `hash(password, salt, user_key)` per spec §4.5: plain SHA-256 for
/// revision 5, Algorithm 2.B for revision 6.
pub fn hash(password: &[u8], salt: &[u8], user_key: &[u8], revision: i64) -> Vec<u8> {
    if revision <= 5 {
        let mut hasher = Sha256::new();
        hasher.update(password);
        hasher.update(salt);
        hasher.update(user_key);
        hasher.finalize().to_vec()
    } else {
        hash_2b(password, salt, user_key)
    }
}

fn hash_2b(password: &[u8], salt: &[u8], user_key: &[u8]) -> Vec<u8> {
    let mut k: Vec<u8> = {
        let mut hasher = Sha256::new();
        hasher.update(password);
        hasher.update(salt);
        hasher.update(user_key);
        hasher.finalize().to_vec()
    };

    let mut round: u32 = 0;
    loop {
        let chunk_len = password.len() + k.len() + user_key.len();
        let mut k1 = Vec::with_capacity(64 * chunk_len);
        for _ in 0..64 {
            k1.extend_from_slice(password);
            k1.extend_from_slice(&k);
            k1.extend_from_slice(user_key);
        }

        let e = Aes128CbcEnc::new(k[0..16].into(), k[16..32].into()).encrypt_padded_vec_mut::<NoPadding>(&k1);

        let remainder: u32 = e[0..16].iter().map(|&b| b as u32).sum::<u32>() % 3;
        k = match remainder {
            0 => Sha256::digest(&e).to_vec(),
            1 => Sha384::digest(&e).to_vec(),
            _ => Sha512::digest(&e).to_vec(),
        };

        round += 1;
        if round >= 64 && (*e.last().expect("E is non-empty") as u32) <= round - 32 {
            break;
        }
    }

    k.truncate(32);
    k
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = hash(b"pw", b"salt1234", b"", 6);
        let b = hash(b"pw", b"salt1234", b"", 6);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn revision_5_is_plain_sha256() {
        let mut hasher = Sha256::new();
        hasher.update(b"pw");
        hasher.update(b"salt1234");
        hasher.update(b"");
        let expected = hasher.finalize().to_vec();
        assert_eq!(hash(b"pw", b"salt1234", b"", 5), expected);
    }
}
