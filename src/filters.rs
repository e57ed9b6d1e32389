//! Stream codec pipeline: decode/encode the filter chain named by a stream
//! dictionary's `/Filter` (and matching `/DecodeParms`) entries.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Filter {
    FlateDecode,
    ASCII85Decode,
    ASCIIHexDecode,
    LZWDecode,
    RunLengthDecode,
}

fn parse_filter(name: &[u8]) -> Result<Filter> {
    match name {
        b"FlateDecode" | b"Fl" => Ok(Filter::FlateDecode),
        b"ASCII85Decode" | b"A85" => Ok(Filter::ASCII85Decode),
        b"ASCIIHexDecode" | b"AHx" => Ok(Filter::ASCIIHexDecode),
        b"LZWDecode" | b"LZW" => Ok(Filter::LZWDecode),
        b"RunLengthDecode" | b"RL" => Ok(Filter::RunLengthDecode),
        other => Err(Error::UnsupportedFilter(String::from_utf8_lossy(other).into_owned())),
    }
}

fn filter_chain(dict: &Dictionary) -> Result<Vec<Filter>> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => Ok(vec![parse_filter(name)?]),
        Ok(Object::Array(names)) => names
            .iter()
            .map(|o| o.as_name().and_then(parse_filter))
            .collect::<Result<Vec<_>>>(),
        _ => Ok(Vec::new()),
    }
}

fn early_change(dict: &Dictionary, index: usize) -> bool {
    let parms = match dict.get(b"DecodeParms") {
        Ok(Object::Dictionary(d)) if index == 0 => Some(d),
        Ok(Object::Array(arr)) => arr.get(index).and_then(|o| o.as_dict().ok()),
        _ => None,
    };
    parms
        .and_then(|d| d.get(b"EarlyChange").ok())
        .and_then(|o| o.as_i64().ok())
        .map(|v| v != 0)
        .unwrap_or(true)
}

pub fn decode(dict: &Dictionary, raw: &[u8]) -> Result<Vec<u8>> {
    let chain = filter_chain(dict)?;
    let mut data = raw.to_vec();
    for (index, filter) in chain.into_iter().enumerate() {
        data = match filter {
            Filter::FlateDecode => flate_decode(&data)?,
            Filter::ASCII85Decode => ascii85_decode(&data)?,
            Filter::ASCIIHexDecode => ascii_hex_decode(&data)?,
            Filter::LZWDecode => lzw_decode(&data, early_change(dict, index))?,
            Filter::RunLengthDecode => run_length_decode(&data)?,
        };
    }
    Ok(data)
}

pub fn encode(dict: &Dictionary, plain: &[u8]) -> Result<Vec<u8>> {
    let chain = filter_chain(dict)?;
    let mut data = plain.to_vec();
    // Encode in reverse filter order so re-decoding undoes them front-to-back.
    for (index, filter) in chain.iter().enumerate().rev() {
        data = match filter {
            Filter::FlateDecode => flate_encode(&data),
            Filter::ASCII85Decode => ascii85_encode(&data),
            Filter::ASCIIHexDecode => ascii_hex_encode(&data),
            Filter::LZWDecode => lzw_encode(&data, early_change(dict, index))?,
            Filter::RunLengthDecode => run_length_encode(&data),
        };
    }
    Ok(data)
}

fn flate_decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| Error::InvalidStream(format!("flate: {e}")))?;
    Ok(out)
}

pub(crate) fn flate_encode(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    let _ = encoder.write_all(data);
    encoder.finish().unwrap_or_default()
}

fn ascii85_decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut group = [0u8; 5];
    let mut n = 0usize;
    let mut iter = data.iter().copied().filter(|&b| !b.is_ascii_whitespace());
    loop {
        match iter.next() {
            Some(b'~') => break,
            Some(b'z') if n == 0 => out.extend_from_slice(&[0, 0, 0, 0]),
            Some(c) => {
                group[n] = c.wrapping_sub(b'!');
                n += 1;
                if n == 5 {
                    push_ascii85_group(&group, 5, &mut out);
                    n = 0;
                }
            }
            None => break,
        }
    }
    if n > 0 {
        for slot in group.iter_mut().skip(n) {
            *slot = 84;
        }
        push_ascii85_group(&group, n, &mut out);
    }
    Ok(out)
}

fn push_ascii85_group(group: &[u8; 5], n: usize, out: &mut Vec<u8>) {
    let mut value: u32 = 0;
    for &g in group.iter() {
        value = value.wrapping_mul(85).wrapping_add(g as u32);
    }
    let bytes = value.to_be_bytes();
    out.extend_from_slice(&bytes[..n.saturating_sub(1).max(1)]);
}

fn ascii85_encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in data.chunks(4) {
        let mut buf = [0u8; 4];
        buf[..chunk.len()].copy_from_slice(chunk);
        let value = u32::from_be_bytes(buf);
        let mut digits = [0u8; 5];
        let mut v = value;
        for d in digits.iter_mut().rev() {
            *d = (v % 85) as u8 + b'!';
            v /= 85;
        }
        if chunk.len() == 4 && value == 0 {
            out.push(b'z');
        } else {
            out.extend_from_slice(&digits[..chunk.len() + 1]);
        }
    }
    out.extend_from_slice(b"~>");
    out
}

fn ascii_hex_decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut hi: Option<u8> = None;
    for &b in data {
        if b == b'>' {
            break;
        }
        if b.is_ascii_whitespace() {
            continue;
        }
        let v = (b as char)
            .to_digit(16)
            .ok_or_else(|| Error::InvalidStream("ASCIIHexDecode: non-hex byte".into()))? as u8;
        match hi.take() {
            Some(h) => out.push((h << 4) | v),
            None => hi = Some(v),
        }
    }
    if let Some(h) = hi {
        out.push(h << 4);
    }
    Ok(out)
}

fn ascii_hex_encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 2 + 1);
    for &b in data {
        out.extend_from_slice(format!("{b:02X}").as_bytes());
    }
    out.push(b'>');
    out
}

fn lzw_decode(data: &[u8], early_change: bool) -> Result<Vec<u8>> {
    let mut decoder = weezl::decode::Decoder::with_tiff_size_switch(
        weezl::BitOrder::Msb,
        8,
    );
    // PDF's LZW defaults to "early change" (code width bumps one code early);
    // weezl's tiff variant matches that, the non-early variant does not.
    let decoder = if early_change {
        decoder
    } else {
        weezl::decode::Decoder::new(weezl::BitOrder::Msb, 8)
    };
    let mut decoder = decoder;
    let result = decoder
        .decode(data)
        .map_err(|e| Error::InvalidStream(format!("lzw: {e:?}")))?;
    Ok(result)
}

fn lzw_encode(data: &[u8], early_change: bool) -> Result<Vec<u8>> {
    let encoder = if early_change {
        weezl::encode::Encoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
    } else {
        weezl::encode::Encoder::new(weezl::BitOrder::Msb, 8)
    };
    let mut encoder = encoder;
    encoder
        .encode(data)
        .map_err(|e| Error::InvalidStream(format!("lzw: {e:?}")))
}

fn run_length_decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let len = data[i];
        i += 1;
        if len == 128 {
            break;
        } else if len < 128 {
            let count = len as usize + 1;
            if i + count > data.len() {
                return Err(Error::InvalidStream("RunLengthDecode: truncated literal run".into()));
            }
            out.extend_from_slice(&data[i..i + count]);
            i += count;
        } else {
            let count = 257 - len as usize;
            if i >= data.len() {
                return Err(Error::InvalidStream("RunLengthDecode: truncated repeat run".into()));
            }
            out.extend(std::iter::repeat(data[i]).take(count));
            i += 1;
        }
    }
    Ok(out)
}

fn run_length_encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let mut run = 1;
        while i + run < data.len() && data[i + run] == data[i] && run < 128 {
            run += 1;
        }
        if run >= 2 {
            out.push((257 - run) as u8);
            out.push(data[i]);
            i += run;
        } else {
            let start = i;
            let mut len = 1;
            i += 1;
            while i < data.len() && len < 128 {
                let mut next_run = 1;
                while i + next_run < data.len() && data[i + next_run] == data[i] && next_run < 128 {
                    next_run += 1;
                }
                if next_run >= 2 {
                    break;
                }
                len += 1;
                i += 1;
            }
            out.push((len - 1) as u8);
            out.extend_from_slice(&data[start..start + len]);
        }
    }
    out.push(128);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_hex_round_trip() {
        let data = b"Hello, PDF!";
        let encoded = ascii_hex_encode(data);
        let decoded = ascii_hex_decode(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn ascii85_round_trip() {
        let data = b"Man is distinguished";
        let encoded = ascii85_encode(data);
        let decoded = ascii85_decode(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn run_length_round_trip() {
        let data = b"aaaaaaaaaaaaXYZbbbbbbbbbbb";
        let encoded = run_length_encode(data);
        let decoded = run_length_decode(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn flate_round_trip() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let encoded = flate_encode(data);
        let decoded = flate_decode(&encoded).unwrap();
        assert_eq!(decoded, data);
    }
}
