//! The Standard Security Handler: password authentication and per-object
//! encryption/decryption for revisions 2 through 6.

mod pkcs5;
mod r6;
mod rc4;

use aes::Aes128;
use aes::Aes256;
use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, KeyInit};
use bitflags::bitflags;
use md5::{Digest as _, Md5};
use rand::RngCore;

use crate::document::Document;
use crate::error::{EncryptionError, Result};
use crate::object::{Dictionary, Object, ObjectId};
use pkcs5::Pkcs5;

bitflags! {
    /// `/P`, bits 3-12 meaningful (spec §4.5); bits are 1-indexed as in the
    /// PDF specification, so `PRINT` is bit 3 == `1 << 2`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permissions: u32 {
        const PRINT = 1 << 2;
        const MODIFY = 1 << 3;
        const COPY = 1 << 4;
        const ANNOTATE = 1 << 5;
        const FILL_FORMS = 1 << 8;
        const EXTRACT_ACCESSIBLE = 1 << 9;
        const ASSEMBLE = 1 << 10;
        const PRINT_HIGH_RES = 1 << 11;
    }
}

impl Permissions {
    /// `/P` is a signed 32-bit integer with bits 1-2 reserved to 0, bits 7-8
    /// reserved to 1; the upper reserved bits fall outside our named flags
    /// and are dropped.
    pub fn from_p(p: i32) -> Permissions {
        Permissions::from_bits_truncate(p as u32)
    }

    pub fn to_p(self) -> i32 {
        ((self.bits() & !0b11) | 0b1100_0000 | 0xFFFF_F000) as i32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cfm {
    None,
    Rc4,
    AesV2,
    AesV3,
}

fn parse_cfm(name: &[u8]) -> Cfm {
    match name {
        b"V2" => Cfm::Rc4,
        b"AESV2" => Cfm::AesV2,
        b"AESV3" => Cfm::AesV3,
        _ => Cfm::None,
    }
}

/// An authenticated Standard Security Handler instance: the derived file
/// key plus enough configuration to encrypt or decrypt any object.
#[derive(Debug, Clone)]
pub struct EncryptionState {
    key: Vec<u8>,
    r: i64,
    stream_cfm: Cfm,
    string_cfm: Cfm,
    pub permissions: Permissions,
    pub encrypt_metadata: bool,
    /// The `/Encrypt` dictionary as authenticated (`/O`, `/U`, `/P`, ...),
    /// kept around so a full rewrite can re-emit it unchanged: deriving a
    /// fresh one would require the original password, which only round-trips
    /// through this dictionary plus `/ID`.
    pub encrypt_dict: Dictionary,
}

/// The fixed 32-byte padding string used to pad/derive passwords for R2-R4
/// (PDF 32000-1 Algorithm 2, step a).
const PASSWORD_PAD: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08, 0x2E, 0x2E, 0x00,
    0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let n = password.len().min(32);
    out[..n].copy_from_slice(&password[..n]);
    out[n..].copy_from_slice(&PASSWORD_PAD[..32 - n]);
    out
}

/// SASLprep-normalize a revision 5/6 password (ISO 32000-2, 7.6.4.3.3). If
/// normalization fails the password is used unmodified, as the spec directs.
fn saslprep_password(password: &str) -> String {
    match stringprep::saslprep(password) {
        Ok(normalized) => normalized.into_owned(),
        Err(_) => password.to_string(),
    }
}

fn md5(parts: &[&[u8]]) -> [u8; 16] {
    let mut hasher = Md5::new();
    for p in parts {
        hasher.update(p);
    }
    hasher.finalize().into()
}

impl EncryptionState {
    /// Authenticate `password` against `document`'s `/Encrypt` dictionary
    /// and, on success, return the derived handler state.
    pub fn decode(document: &Document, password: &str) -> Result<EncryptionState> {
        let encrypt_ref = document
            .trailer
            .get(b"Encrypt")
            .and_then(Object::as_reference)
            .map_err(|_| EncryptionError::DictInvalid("missing /Encrypt"))?;
        let dict = document
            .get_dictionary(encrypt_ref)
            .map_err(|_| EncryptionError::DictInvalid("unreadable /Encrypt"))?;

        let filter = dict.get(b"Filter").and_then(Object::as_name).unwrap_or(b"Standard");
        if filter != b"Standard" {
            return Err(EncryptionError::UnsupportedFilter.into());
        }

        let v = dict.get(b"V").and_then(Object::as_i64).unwrap_or(0);
        let r = dict.get(b"R").and_then(Object::as_i64).map_err(|_| EncryptionError::DictInvalid("missing /R"))?;
        if !matches!((v, r), (1, 2) | (2, 3) | (3, 3) | (4, 4) | (5, 5) | (5, 6)) {
            document.warn(
                crate::document::WarningKind::NonStandardEncryptionVersion,
                format!("non-standard /V {v} /R {r} combination"),
            );
        }

        let o = dict.get(b"O").and_then(Object::as_str).map_err(|_| EncryptionError::DictInvalid("missing /O"))?;
        let u = dict.get(b"U").and_then(Object::as_str).map_err(|_| EncryptionError::DictInvalid("missing /U"))?;
        let p = dict.get(b"P").and_then(Object::as_i64).map_err(|_| EncryptionError::DictInvalid("missing /P"))? as i32;
        let encrypt_metadata = dict.get(b"EncryptMetadata").and_then(Object::as_bool).unwrap_or(true);

        let (stream_cfm, string_cfm) = crypt_filters(dict, v);

        let key_bits = dict.get(b"Length").and_then(Object::as_i64).unwrap_or(40);
        let key_len_bytes = (key_bits / 8).clamp(5, 32) as usize;

        let file_id = document
            .trailer
            .get(b"ID")
            .and_then(Object::as_array)
            .ok()
            .and_then(|arr| arr.first())
            .and_then(|v| v.as_str().ok())
            .unwrap_or(&[])
            .to_vec();

        let encrypt_dict = dict.clone();

        if r <= 4 {
            Self::authenticate_r2_r4(password.as_bytes(), o, u, p, &file_id, r, key_len_bytes, encrypt_metadata).map(|key| {
                EncryptionState { key, r, stream_cfm, string_cfm, permissions: Permissions::from_p(p), encrypt_metadata, encrypt_dict }
            })
        } else {
            let oe = dict.get(b"OE").and_then(Object::as_str).unwrap_or(&[]);
            let ue = dict.get(b"UE").and_then(Object::as_str).unwrap_or(&[]);
            let normalized = saslprep_password(password);
            Self::authenticate_r5_r6(normalized.as_bytes(), o, u, oe, ue, r).map(|key| EncryptionState {
                key,
                r,
                stream_cfm,
                string_cfm,
                permissions: Permissions::from_p(p),
                encrypt_metadata,
                encrypt_dict,
            })
        }
    }

    fn authenticate_r2_r4(
        password: &[u8], o: &[u8], u: &[u8], p: i32, file_id: &[u8], r: i64, key_len: usize, encrypt_metadata: bool,
    ) -> Result<Vec<u8>> {
        let padded_user = pad_password(password);

        let file_key = |padded: &[u8; 32]| -> Vec<u8> {
            let p_le = p.to_le_bytes();
            let extra: &[u8] = if r >= 4 && !encrypt_metadata { &[0xFF, 0xFF, 0xFF, 0xFF] } else { &[] };
            let mut key = md5(&[padded, o, &p_le, file_id, extra]).to_vec();
            if r >= 3 {
                for _ in 0..50 {
                    key = md5(&[&key[..key_len]]).to_vec();
                }
            }
            key.truncate(key_len);
            key
        };

        let expected_u = |key: &[u8]| -> Vec<u8> {
            if r == 2 {
                rc4::apply(key, &PASSWORD_PAD)
            } else {
                let mut hasher = Md5::new();
                hasher.update(PASSWORD_PAD);
                hasher.update(file_id);
                let mut digest: Vec<u8> = hasher.finalize().to_vec();
                for i in 0..20u8 {
                    let round_key: Vec<u8> = key.iter().map(|b| b ^ i).collect();
                    digest = rc4::apply(&round_key, &digest);
                }
                digest.resize(32, 0);
                digest
            }
        };

        // Try as a user password first.
        let candidate_key = file_key(&padded_user);
        let check_len = if r == 2 { 32 } else { 16 };
        if expected_u(&candidate_key)[..check_len] == u[..check_len.min(u.len())] {
            return Ok(candidate_key);
        }

        // Fall back to treating the input as the owner password: recover
        // the user password from /O and retry.
        let mut owner_key = md5(&[&padded_user]).to_vec();
        if r >= 3 {
            for _ in 0..50 {
                owner_key = md5(&[&owner_key[..key_len]]).to_vec();
            }
        }
        owner_key.truncate(key_len);

        let recovered_user_password = if r == 2 {
            rc4::apply(&owner_key, o)
        } else {
            let mut data = o.to_vec();
            for i in (0..20u8).rev() {
                let round_key: Vec<u8> = owner_key.iter().map(|b| b ^ i).collect();
                data = rc4::apply(&round_key, &data);
            }
            data
        };

        let mut padded_owner_path = [0u8; 32];
        let n = recovered_user_password.len().min(32);
        padded_owner_path[..n].copy_from_slice(&recovered_user_password[..n]);
        if n < 32 {
            padded_owner_path[n..].copy_from_slice(&PASSWORD_PAD[..32 - n]);
        }
        let candidate_key = file_key(&padded_owner_path);
        if expected_u(&candidate_key)[..check_len] == u[..check_len.min(u.len())] {
            return Ok(candidate_key);
        }

        Err(EncryptionError::InvalidCredentials.into())
    }

    fn authenticate_r5_r6(password: &[u8], o: &[u8], u: &[u8], oe: &[u8], ue: &[u8], r: i64) -> Result<Vec<u8>> {
        let password = &password[..password.len().min(127)];

        if u.len() >= 48 {
            let (hash, validation_salt, key_salt) = (&u[0..32], &u[32..40], &u[40..48]);
            if r6::hash(password, validation_salt, &[], r) == hash {
                let intermediate = r6::hash(password, key_salt, &[], r);
                return Ok(aes256_cbc_no_padding_decrypt(&intermediate, &[0u8; 16], ue));
            }
        }

        if o.len() >= 48 && u.len() >= 48 {
            let (hash, validation_salt, key_salt) = (&o[0..32], &o[32..40], &o[40..48]);
            if r6::hash(password, validation_salt, u, r) == hash {
                let intermediate = r6::hash(password, key_salt, u, r);
                return Ok(aes256_cbc_no_padding_decrypt(&intermediate, &[0u8; 16], oe));
            }
        }

        Err(EncryptionError::InvalidCredentials.into())
    }

    /// Derive the per-object key for content transformed under `cfm`. The
    /// `"sAlT"` suffix (spec §4.5, Algorithm 1) applies only to the crypt
    /// filter method of the content actually being transformed, so a mixed
    /// V4 document (e.g. `/StmF` AESV2, `/StrF` V2) must derive two
    /// different keys rather than one shared one.
    fn object_key(&self, id: ObjectId, cfm: Cfm) -> Vec<u8> {
        if self.r >= 5 {
            return self.key.clone();
        }
        let mut parts = self.key.clone();
        parts.push((id.0 & 0xFF) as u8);
        parts.push(((id.0 >> 8) & 0xFF) as u8);
        parts.push(((id.0 >> 16) & 0xFF) as u8);
        parts.push((id.1 & 0xFF) as u8);
        parts.push(((id.1 >> 8) & 0xFF) as u8);
        if matches!(cfm, Cfm::AesV2) {
            parts.extend_from_slice(b"sAlT");
        }
        let digest = md5(&[&parts]);
        let len = (self.key.len() + 5).min(16);
        digest[..len].to_vec()
    }

    fn transform(&self, cfm: Cfm, key: &[u8], data: &[u8], encrypt: bool) -> Vec<u8> {
        match cfm {
            Cfm::None => data.to_vec(),
            Cfm::Rc4 => rc4::apply(key, data),
            Cfm::AesV2 => aes_cbc(key, data, encrypt, false),
            Cfm::AesV3 => aes_cbc(key, data, encrypt, true),
        }
    }
}

fn crypt_filters(dict: &Dictionary, v: i64) -> (Cfm, Cfm) {
    if v < 4 {
        return (Cfm::Rc4, Cfm::Rc4);
    }
    let cf = dict.get(b"CF").and_then(Object::as_dict).ok();
    let lookup = |name: &[u8]| -> Cfm {
        if name == b"Identity" {
            return Cfm::None;
        }
        cf.and_then(|cf| cf.get(name).ok())
            .and_then(|o| o.as_dict().ok())
            .and_then(|d| d.get(b"CFM").and_then(Object::as_name).ok())
            .map(parse_cfm)
            .unwrap_or(Cfm::None)
    };
    let stm_name = dict.get(b"StmF").and_then(Object::as_name).unwrap_or(b"Identity").to_vec();
    let str_name = dict.get(b"StrF").and_then(Object::as_name).unwrap_or(b"Identity").to_vec();
    (lookup(&stm_name), lookup(&str_name))
}

fn aes_cbc(key: &[u8], data: &[u8], encrypt: bool, is_256: bool) -> Vec<u8> {
    if encrypt {
        let mut iv = [0u8; 16];
        rand::rng().fill_bytes(&mut iv);
        let mut out = iv.to_vec();
        let body = if is_256 {
            cbc::Encryptor::<Aes256>::new(key.into(), (&iv).into()).encrypt_padded_vec_mut::<Pkcs5>(data)
        } else {
            cbc::Encryptor::<Aes128>::new(key.into(), (&iv).into()).encrypt_padded_vec_mut::<Pkcs5>(data)
        };
        out.extend_from_slice(&body);
        out
    } else {
        if data.len() < 16 {
            return Vec::new();
        }
        let (iv, body) = data.split_at(16);
        if is_256 {
            cbc::Decryptor::<Aes256>::new(key.into(), iv.into())
                .decrypt_padded_vec_mut::<Pkcs5>(body)
                .unwrap_or_default()
        } else {
            cbc::Decryptor::<Aes128>::new(key.into(), iv.into())
                .decrypt_padded_vec_mut::<Pkcs5>(body)
                .unwrap_or_default()
        }
    }
}

fn aes256_cbc_no_padding_decrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Vec<u8> {
    cbc::Decryptor::<Aes256>::new(key.into(), iv.into()).decrypt_padded_vec_mut::<NoPadding>(data).unwrap_or_default()
}

/// Verify a decoded R6 file key against `/Perms` (spec §4.5's extra R6
/// check). Not fatal on mismatch by itself; callers decide how to treat it.
pub fn verify_perms(key: &[u8], perms: &[u8], p: i32, encrypt_metadata: bool) -> bool {
    if perms.len() != 16 || key.len() < 16 {
        return false;
    }
    let decrypted = ecb::Decryptor::<Aes128>::new(key[..16].into()).decrypt_padded_vec_mut::<NoPadding>(perms);
    let decrypted = match decrypted {
        Ok(d) => d,
        Err(_) => return false,
    };
    if decrypted.len() < 12 {
        return false;
    }
    let p_bytes = i32::from_le_bytes(decrypted[0..4].try_into().unwrap());
    let metadata_flag = decrypted[8];
    &decrypted[9..12] == b"adb" && p_bytes == p && (metadata_flag == b'T') == encrypt_metadata
}

/// Decrypt every string and stream payload inside `object` using per-object
/// derived key material. Called on every loaded object except the
/// `/Encrypt` dictionary itself and, when `/EncryptMetadata` is false,
/// `/Type /Metadata` streams.
pub fn decrypt_object(state: &EncryptionState, id: ObjectId, object: &mut Object) -> Result<()> {
    crypt_object(state, id, object, false)
}

/// The encrypting counterpart of [`decrypt_object`], used by the writer
/// when re-serializing a document whose `/Encrypt` state is unchanged.
pub fn encrypt_object(state: &EncryptionState, id: ObjectId, object: &mut Object) -> Result<()> {
    crypt_object(state, id, object, true)
}

fn crypt_object(state: &EncryptionState, id: ObjectId, object: &mut Object, encrypt: bool) -> Result<()> {
    if let Object::Stream(stream) = object {
        if !state.encrypt_metadata && stream.dict.has_type(b"Metadata") {
            return Ok(());
        }
        if stream.dict.has_type(b"XRef") {
            return Ok(());
        }
    }

    let string_key = state.object_key(id, state.string_cfm);
    walk_strings(object, &string_key, state, encrypt);

    if let Object::Stream(stream) = object {
        let stream_key = state.object_key(id, state.stream_cfm);
        stream.content = state.transform(state.stream_cfm, &stream_key, &stream.content, encrypt);
    }
    Ok(())
}

fn walk_strings(object: &mut Object, key: &[u8], state: &EncryptionState, encrypt: bool) {
    match object {
        Object::String(bytes, _) => {
            *bytes = state.transform(state.string_cfm, key, bytes, encrypt);
        }
        Object::Array(items) => {
            for item in items {
                walk_strings(item, key, state, encrypt);
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter_mut() {
                walk_strings(value, key, state, encrypt);
            }
        }
        Object::Stream(stream) => {
            for (_, value) in stream.dict.iter_mut() {
                walk_strings(value, key, state, encrypt);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissions_round_trip_bits() {
        let p = Permissions::PRINT | Permissions::COPY;
        let packed = p.to_p();
        let reparsed = Permissions::from_p(packed);
        assert!(reparsed.contains(Permissions::PRINT));
        assert!(reparsed.contains(Permissions::COPY));
    }

    #[test]
    fn to_p_round_trips_a_correctly_reserved_value() {
        // bits 1-2 clear, bits 7-8 set, PRINT/COPY/ASSEMBLE named bits set.
        let valid_p = (Permissions::PRINT | Permissions::COPY | Permissions::ASSEMBLE).bits() | 0b1100_0000 | 0xFFFF_F000;
        let valid_p = valid_p as i32;
        assert_eq!(Permissions::from_p(valid_p).to_p(), valid_p);
    }

    #[test]
    fn pad_password_fills_to_32_bytes() {
        let padded = pad_password(b"abc");
        assert_eq!(padded.len(), 32);
        assert_eq!(&padded[..3], b"abc");
        assert_eq!(padded[3], PASSWORD_PAD[0]);
    }
}
