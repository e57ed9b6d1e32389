//! The tokenizer / value parser and the xref-section parser.
//!
//! Built on `nom` over a `nom_locate::LocatedSpan`, following the teacher's
//! parser architecture. Content-stream operator parsing is out of this
//! core's scope (spec §1) — only PDF *values* (the object model) and xref
//! structure are parsed here.

use std::collections::HashSet;
use std::str::{self, FromStr};

use nom::branch::alt;
use nom::bytes::complete::{tag, take, take_while, take_while1, take_while_m_n};
use nom::character::complete::{digit0, digit1, one_of};
use nom::combinator::{map, map_opt, map_res, opt, verify};
use nom::error::{ErrorKind, ParseError as NomParseError};
use nom::multi::{fold_many0, fold_many1, many0, many0_count};
use nom::sequence::{delimited, pair, preceded, separated_pair, terminated};
use nom::{AsChar, Input, IResult, Parser};
use nom_locate::LocatedSpan;

use crate::error::{Error, ParseError};
use crate::object::{Dictionary, Object, ObjectId, Stream, StringFormat};
use crate::reader::{Reader, MAX_BRACKET};
use crate::xref::{Xref, XrefEntry, XrefType};

pub(crate) type ParserInput<'a> = LocatedSpan<&'a [u8], &'a str>;
pub(crate) type NomError<'a> = nom::error::Error<ParserInput<'a>>;
pub(crate) type NomResult<'a, O, E = NomError<'a>> = IResult<ParserInput<'a>, O, E>;

#[inline]
fn strip_nom<O>(r: NomResult<O>) -> Option<O> {
    r.ok().map(|(_, o)| o)
}

#[inline]
fn convert_result<O, E>(result: std::result::Result<O, E>, input: ParserInput, error_kind: ErrorKind) -> NomResult<O> {
    result.map(|o| (input, o)).map_err(|_| {
        let err: NomError = nom::error::Error::from_error_kind(input, error_kind);
        nom::Err::Error(err)
    })
}

#[inline]
fn offset_stream(object: &mut Object, offset: usize) {
    if let Object::Stream(stream) = object {
        stream.start_position = stream.start_position.and_then(|sp| sp.checked_add(offset));
    }
}

pub(crate) fn eol(input: ParserInput) -> NomResult<ParserInput> {
    alt((tag(&b"\r\n"[..]), tag(&b"\n"[..]), tag(&b"\r"[..]))).parse(input)
}

pub(crate) fn comment(input: ParserInput) -> NomResult<()> {
    map((tag(&b"%"[..]), take_while(|c: u8| !b"\r\n".contains(&c)), eol), |_| ()).parse(input)
}

#[inline]
fn is_whitespace(c: u8) -> bool {
    b" \t\n\r\0\x0C".contains(&c)
}

#[inline]
fn is_delimiter(c: u8) -> bool {
    b"()<>[]{}/%".contains(&c)
}

#[inline]
fn is_regular(c: u8) -> bool {
    !is_whitespace(c) && !is_delimiter(c)
}

#[inline]
fn is_direct_literal_string(c: u8) -> bool {
    !b"()\\\r\n".contains(&c)
}

fn white_space(input: ParserInput) -> NomResult<()> {
    map(take_while(is_whitespace), |_| ()).parse(input)
}

fn space(input: ParserInput) -> NomResult<()> {
    fold_many0(alt((map(take_while1(is_whitespace), |_| ()), comment)), || {}, |_, _| ()).parse(input)
}

fn integer(input: ParserInput) -> NomResult<i64> {
    let (i, _) = pair(opt(one_of("+-")), digit1).parse(input)?;
    let int_input = &input[..input.len() - i.len()];
    convert_result(i64::from_str(str::from_utf8(int_input).unwrap()), i, ErrorKind::Digit)
}

fn real(input: ParserInput) -> NomResult<f64> {
    let (i, _) = pair(
        opt(one_of("+-")),
        alt((
            map((digit1, tag(&b"."[..]), digit0), |_| ()),
            map(pair(tag(&b"."[..]), digit1), |_| ()),
        )),
    )
    .parse(input)?;

    let float_input = &input[..input.len() - i.len()];
    convert_result(f64::from_str(str::from_utf8(float_input).unwrap()), i, ErrorKind::Digit)
}

pub(crate) fn hex_char(input: ParserInput) -> NomResult<u8> {
    map_res(
        verify(take(2usize), |h: &ParserInput| h.as_bytes().iter().copied().all(AsChar::is_hex_digit)),
        |x: ParserInput| u8::from_str_radix(str::from_utf8(&x).unwrap(), 16),
    )
    .parse(input)
}

fn oct_char(input: ParserInput) -> NomResult<u8> {
    map_res(take_while_m_n(1, 3, AsChar::is_oct_digit), |x: ParserInput| {
        u16::from_str_radix(str::from_utf8(&x).unwrap(), 8).map(|o| o as u8)
    })
    .parse(input)
}

pub(crate) fn name(input: ParserInput) -> NomResult<Vec<u8>> {
    preceded(
        tag(&b"/"[..]),
        many0(alt((
            preceded(tag(&b"#"[..]), hex_char),
            map_opt(take(1usize), |c: ParserInput| {
                if c[0] != b'#' && is_regular(c[0]) { Some(c[0]) } else { None }
            }),
        ))),
    )
    .parse(input)
}

fn escape_sequence(input: ParserInput) -> NomResult<Option<u8>> {
    preceded(
        tag(&b"\\"[..]),
        alt((
            map(oct_char, Some),
            map(eol, |_| None),
            map(tag(&b"n"[..]), |_| Some(b'\n')),
            map(tag(&b"r"[..]), |_| Some(b'\r')),
            map(tag(&b"t"[..]), |_| Some(b'\t')),
            map(tag(&b"b"[..]), |_| Some(b'\x08')),
            map(tag(&b"f"[..]), |_| Some(b'\x0C')),
            map(take(1usize), |c: ParserInput| Some(c[0])),
        )),
    )
    .parse(input)
}

enum InnerLiteralString<'a> {
    Direct(ParserInput<'a>),
    Escape(Option<u8>),
    Eol(ParserInput<'a>),
    Nested(Vec<u8>),
}

impl InnerLiteralString<'_> {
    fn push(&self, output: &mut Vec<u8>) {
        match self {
            InnerLiteralString::Direct(s) | InnerLiteralString::Eol(s) => output.extend_from_slice(s),
            InnerLiteralString::Escape(e) => output.extend(e),
            InnerLiteralString::Nested(n) => output.extend_from_slice(n),
        }
    }
}

fn inner_literal_string(depth: usize) -> impl Fn(ParserInput) -> NomResult<Vec<u8>> {
    move |input| {
        fold_many0(
            alt((
                map(take_while1(is_direct_literal_string), InnerLiteralString::Direct),
                map(escape_sequence, InnerLiteralString::Escape),
                map(eol, InnerLiteralString::Eol),
                map(nested_literal_string(depth), InnerLiteralString::Nested),
            )),
            Vec::new,
            |mut out: Vec<u8>, value| {
                value.push(&mut out);
                out
            },
        )
        .parse(input)
    }
}

fn nested_literal_string(depth: usize) -> impl Fn(ParserInput) -> NomResult<Vec<u8>> {
    move |input| {
        if depth == 0 {
            map(verify(tag(&b"too deep"[..]), |_| false), |_| vec![]).parse(input)
        } else {
            map(delimited(tag(&b"("[..]), inner_literal_string(depth - 1), tag(&b")"[..])), |mut content| {
                content.insert(0, b'(');
                content.push(b')');
                content
            })
            .parse(input)
        }
    }
}

fn literal_string(input: ParserInput) -> NomResult<Vec<u8>> {
    delimited(tag(&b"("[..]), inner_literal_string(MAX_BRACKET), tag(&b")"[..])).parse(input)
}

fn hexadecimal_string(input: ParserInput) -> NomResult<Object> {
    map(
        delimited(
            tag(&b"<"[..]),
            terminated(
                fold_many0(
                    preceded(white_space, hex_digit),
                    || -> (Vec<u8>, bool) { (Vec::new(), false) },
                    |state, c| match state {
                        (mut out, false) => {
                            out.push(c << 4);
                            (out, true)
                        }
                        (mut out, true) => {
                            *out.last_mut().unwrap() |= c;
                            (out, false)
                        }
                    },
                ),
                white_space,
            ),
            tag(&b">"[..]),
        ),
        |(bytes, _)| Object::String(bytes, StringFormat::Hexadecimal),
    )
    .parse(input)
}

#[inline]
fn hex_digit(input: ParserInput) -> NomResult<u8> {
    map_opt(take(1usize), |c: ParserInput| str::from_utf8(&c).ok().and_then(|c| u8::from_str_radix(c, 16).ok()))
        .parse(input)
}

fn boolean(input: ParserInput) -> NomResult<Object> {
    alt((map(tag(&b"true"[..]), |_| Object::Boolean(true)), map(tag(&b"false"[..]), |_| Object::Boolean(false))))
        .parse(input)
}

fn null(input: ParserInput) -> NomResult<Object> {
    map(tag(&b"null"[..]), |_| Object::Null).parse(input)
}

fn array(input: ParserInput) -> NomResult<Vec<Object>> {
    delimited(pair(tag(&b"["[..]), space), many0(_direct_object), tag(&b"]"[..])).parse(input)
}

pub(crate) fn dictionary(input: ParserInput) -> NomResult<Dictionary> {
    delimited(pair(tag(&b"<<"[..]), space), inner_dictionary, tag(&b">>"[..])).parse(input)
}

fn inner_dictionary(input: ParserInput) -> NomResult<Dictionary> {
    fold_many0(
        pair(terminated(name, space), _direct_object),
        Dictionary::new,
        |mut dict, (key, value)| {
            dict.set(key, value);
            dict
        },
    )
    .parse(input)
}

fn stream<'a>(input: ParserInput<'a>, reader: &Reader, already_seen: &mut HashSet<ObjectId>) -> NomResult<'a, Object> {
    let (i, dict) = terminated(dictionary, (space, tag(&b"stream"[..]), nom::character::complete::space0, eol)).parse(input)?;

    if let Ok(length) = dict.get(b"Length").and_then(|value| {
        if let Ok(id) = value.as_reference() {
            reader.get_object(id, already_seen).and_then(|value| value.as_i64())
        } else {
            value.as_i64()
        }
    }) {
        if length < 0 {
            return Err(nom::Err::Failure(NomError::from_error_kind(i, ErrorKind::LengthValue)));
        }
        let (i, data) = terminated(take(length as usize), pair(opt(eol), tag(&b"endstream"[..]))).parse(i)?;
        Ok((i, Object::Stream(Stream::new(dict, data.to_vec()))))
    } else {
        Ok((i, Object::Stream(Stream::with_position(dict, input.len() - i.len()))))
    }
}

fn unsigned_int<I: FromStr>(input: ParserInput) -> NomResult<I> {
    map_res(digit1, |digits: ParserInput| I::from_str(str::from_utf8(&digits).unwrap())).parse(input)
}

fn object_id(input: ParserInput) -> NomResult<ObjectId> {
    pair(terminated(unsigned_int, space), terminated(unsigned_int, space)).parse(input)
}

fn reference(input: ParserInput) -> NomResult<Object> {
    map(terminated(object_id, tag(&b"R"[..])), Object::Reference).parse(input)
}

fn _direct_objects(input: ParserInput) -> NomResult<Object> {
    alt((
        null,
        boolean,
        reference,
        map(real, Object::Real),
        map(integer, Object::Integer),
        map(name, Object::Name),
        map(literal_string, Object::string_literal),
        hexadecimal_string,
        map(array, Object::Array),
        map(dictionary, Object::Dictionary),
    ))
    .parse(input)
}

fn _direct_object(input: ParserInput) -> NomResult<Object> {
    terminated(_direct_objects, space).parse(input)
}

/// Parse a single PDF value with no indirect-object or stream context —
/// used for object-stream member parsing and standalone value tests.
pub fn direct_object(input: ParserInput) -> Option<Object> {
    strip_nom(_direct_object.parse(input))
}

fn object<'a>(input: ParserInput<'a>, reader: &Reader, already_seen: &mut HashSet<ObjectId>) -> NomResult<'a, Object> {
    terminated(alt((|input| stream(input, reader, already_seen), _direct_objects)), space).parse(input)
}

pub fn indirect_object(
    input: ParserInput, offset: usize, expected_id: Option<ObjectId>, reader: &Reader,
    already_seen: &mut HashSet<ObjectId>,
) -> crate::error::Result<(ObjectId, Object)> {
    let (id, mut object) = _indirect_object(input.take_from(offset), offset, expected_id, reader, already_seen)?;
    offset_stream(&mut object, offset);
    Ok((id, object))
}

fn _indirect_object<'a>(
    input: ParserInput<'a>, offset: usize, expected_id: Option<ObjectId>, reader: &Reader,
    already_seen: &mut HashSet<ObjectId>,
) -> crate::error::Result<(ObjectId, Object)> {
    let (i, (_, object_id)) =
        terminated((space, object_id), pair(tag(&b"obj"[..]), space)).parse(input).map_err(|_| Error::IndirectObject { offset })?;
    if let Some(expected_id) = expected_id {
        if object_id != expected_id {
            return Err(Error::ObjectIdMismatch);
        }
    }

    let object_offset = input.len() - i.len();
    let (_, mut object) = terminated(
        |i: ParserInput<'a>| object(i, reader, already_seen),
        (space, opt(tag(&b"endobj"[..])), space),
    )
    .parse(i)
    .map_err(|_| Error::IndirectObject { offset })?;

    offset_stream(&mut object, object_offset);
    Ok((object_id, object))
}

pub fn header(input: ParserInput) -> Option<String> {
    strip_nom(
        map_res(
            delimited(tag(&b"%PDF-"[..]), take_while(|c: u8| !b"\r\n".contains(&c)), pair(eol, many0_count(comment))),
            |v: ParserInput| str::from_utf8(&v).map(Into::into),
        )
        .parse(input),
    )
}

pub fn binary_mark(input: ParserInput) -> Option<Vec<u8>> {
    strip_nom(
        map_res(
            delimited(tag(&b"%"[..]), take_while(|c: u8| !b"\r\n".contains(&c)), pair(eol, many0_count(comment))),
            |v: ParserInput| Ok::<Vec<u8>, ()>(v.to_vec()),
        )
        .parse(input),
    )
}

/// Decode a classic xref table section (not the trailer that follows it).
fn xref(input: ParserInput) -> NomResult<Xref> {
    let xref_eol = map(alt((tag(&b" \r"[..]), tag(&b" \n"[..]), tag(&b"\r\n"[..]))), |_| ());
    let xref_entry = pair(
        separated_pair(unsigned_int, tag(&b" "[..]), unsigned_int::<u32>),
        delimited(tag(&b" "[..]), map(one_of("nf"), |k| k == 'n'), xref_eol),
    );

    let xref_section = pair(
        separated_pair(unsigned_int::<usize>, tag(&b" "[..]), unsigned_int::<u32>),
        preceded(pair(opt(tag(&b" "[..])), eol), many0(xref_entry)),
    );

    delimited(
        pair(tag(&b"xref"[..]), eol),
        fold_many1(
            xref_section,
            || -> Xref { Xref::new(0, XrefType::CrossReferenceTable) },
            |mut xref, ((start, _count), entries)| {
                for (index, ((offset, generation), is_normal)) in entries.into_iter().enumerate() {
                    let obj_num = (start + index) as u32;
                    if is_normal {
                        if let Ok(generation) = generation.try_into() {
                            xref.insert(obj_num, XrefEntry::Normal { offset, generation });
                        }
                    } else if obj_num != 0 {
                        // `offset` here is actually the next-free object number
                        // for free entries; `generation` is the free record's own.
                        if let Ok(generation) = generation.try_into() {
                            xref.insert(obj_num, XrefEntry::Free { next_free: offset, generation });
                        }
                    }
                }
                xref
            },
        ),
        space,
    )
    .parse(input)
}

fn trailer(input: ParserInput) -> NomResult<Dictionary> {
    delimited(pair(tag(&b"trailer"[..]), space), dictionary, space).parse(input)
}

pub fn xref_and_trailer(input: ParserInput, reader: &Reader) -> crate::error::Result<(Xref, Dictionary)> {
    let xref_trailer = map(pair(xref, trailer), |(mut xref, trailer)| {
        xref.size = trailer.get(b"Size").and_then(Object::as_i64).map_err(|_| ParseError::InvalidTrailer)? as u32;
        Ok((xref, trailer))
    });

    alt((
        xref_trailer,
        (|input| {
            _indirect_object(input, 0, None, reader, &mut HashSet::new())
                .map(|(_, obj)| {
                    let res = match obj {
                        Object::Stream(stream) => decode_xref_stream(stream),
                        _ => Err(ParseError::InvalidXref.into()),
                    };
                    (input, res)
                })
                .map_err(|_| nom::Err::Error(NomError::from_error_kind(input, ErrorKind::Fail)))
        }),
    ))
    .parse(input)
    .map(|(_, o)| o)
    .map_err(|_| ParseError::InvalidTrailer)?
}

pub fn xref_start(input: ParserInput) -> Option<i64> {
    strip_nom(
        delimited(pair(tag(&b"startxref"[..]), eol), trim_spaces(integer), (eol, tag(&b"%%EOF"[..]), space)).parse(input),
    )
}

fn trim_spaces<'a, O>(
    p: impl Parser<ParserInput<'a>, Output = O, Error = nom::error::Error<LocatedSpan<&'a [u8], &'a str>>>,
) -> impl Parser<ParserInput<'a>, Output = O, Error = nom::error::Error<LocatedSpan<&'a [u8], &'a str>>> {
    delimited(many0(tag(" ")), p, many0(tag(" ")))
}

/// Decode an xref stream (`/Type /XRef`) into the effective table plus its
/// dictionary (which doubles as the trailer).
fn decode_xref_stream(mut stream: Stream) -> crate::error::Result<(Xref, Dictionary)> {
    let dict = stream.dict.clone();

    let widths: Vec<usize> = dict
        .get(b"W")
        .and_then(Object::as_array)
        .map_err(|_| ParseError::InvalidXref)?
        .iter()
        .map(|o| o.as_i64().unwrap_or(0) as usize)
        .collect();
    if widths.len() != 3 {
        return Err(ParseError::InvalidXref.into());
    }

    let size = dict.get(b"Size").and_then(Object::as_i64).map_err(|_| ParseError::InvalidXref)? as u32;

    let index: Vec<(u32, u32)> = match dict.get(b"Index") {
        Ok(Object::Array(arr)) => arr
            .chunks(2)
            .filter_map(|pair| {
                let first = pair.first()?.as_i64().ok()? as u32;
                let count = pair.get(1)?.as_i64().ok()? as u32;
                Some((first, count))
            })
            .collect(),
        _ => vec![(0, size)],
    };

    let data = stream.decompressed_content()?;
    let record_width = widths.iter().sum::<usize>();
    if record_width == 0 {
        return Err(ParseError::InvalidXref.into());
    }

    let mut xref = Xref::new(size, XrefType::CrossReferenceStream);
    let mut pos = 0usize;
    'sections: for (first_obj, count) in index {
        for i in 0..count {
            if pos + record_width > data.len() {
                break 'sections;
            }
            let field = |w: usize, offset: usize| -> u64 {
                let mut v: u64 = 0;
                for &b in &data[pos + offset..pos + offset + w] {
                    v = (v << 8) | b as u64;
                }
                v
            };
            let w0 = widths[0];
            let w1 = widths[1];
            let w2 = widths[2];

            let field_type = if w0 == 0 { 1 } else { field(w0, 0) };
            let f2 = field(w1, w0);
            let f3 = field(w2, w0 + w1);

            let obj_num = first_obj + i;
            match field_type {
                0 => {
                    xref.insert(obj_num, XrefEntry::Free { next_free: f2 as u32, generation: f3 as u16 });
                }
                1 => {
                    xref.insert(obj_num, XrefEntry::Normal { offset: f2 as u32, generation: f3 as u16 });
                }
                2 => {
                    xref.insert(obj_num, XrefEntry::Compressed { container: f2 as u32, index: f3 as u32 });
                }
                _ => {}
            }
            pos += record_width;
        }
    }

    Ok((xref, dict))
}

/// Parse an object stream's `/N` header: `N` pairs of `object-number
/// relative-offset`, whitespace separated.
pub fn object_stream_header(input: ParserInput, n: usize) -> Option<Vec<(u32, usize)>> {
    let parser = preceded(
        white_space,
        fold_many0(
            terminated(separated_pair(unsigned_int::<u32>, white_space, unsigned_int::<usize>), white_space),
            Vec::new,
            |mut acc: Vec<(u32, usize)>, pair| {
                acc.push(pair);
                acc
            },
        ),
    );
    strip_nom(parser.parse(input)).map(|mut v| {
        v.truncate(n);
        v
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_span(s: &'_ [u8]) -> ParserInput<'_> {
        LocatedSpan::new_extra(s, "test")
    }

    fn tstrip<O>(r: NomResult<O>) -> Option<O> {
        r.ok().and_then(|(i, o)| if !i.is_empty() { None } else { Some(o) })
    }

    #[test]
    fn parse_real_number() {
        let real = |i| tstrip(real(i));
        assert_eq!(real(test_span(b"0.12")), Some(0.12));
        assert_eq!(real(test_span(b"-.12")), Some(-0.12));
        assert_eq!(real(test_span(b"10.")), Some(10.0));
    }

    #[test]
    fn parse_string() {
        let literal_string = |i| tstrip(literal_string(i));
        let data = vec![
            ("()", ""),
            ("(text())", "text()"),
            ("(text\r\n\\\\(nested\\t\\b\\f))", "text\r\n\\(nested\t\x08\x0C)"),
            ("(text\\0\\53\\053\\0053)", "text\0++\x053"),
            ("(text line\\\n())", "text line()"),
        ];
        for (input, expected) in data {
            assert_eq!(literal_string(test_span(input.as_bytes())), Some(expected.as_bytes().to_vec()));
        }
    }

    #[test]
    fn parse_name() {
        let (text, expected) = (b"/ABC#5f", b"ABC\x5F");
        assert_eq!(tstrip(name(test_span(text))), Some(expected.to_vec()));
        let (text, expected) = (b"/#cb#ce#cc#e5", b"\xcb\xce\xcc\xe5");
        assert_eq!(tstrip(name(test_span(text))), Some(expected.to_vec()));
    }

    #[test]
    fn hex_partial() {
        let out = tstrip(hexadecimal_string(test_span(b"<901FA>")));
        match out {
            Some(Object::String(s, _)) => assert_eq!(s, b"\x90\x1F\xA0".to_vec()),
            _ => panic!("unexpected {:?}", out),
        }
    }

    #[test]
    fn hex_separated() {
        let out = tstrip(hexadecimal_string(test_span(b"<9 01F A>")));
        match out {
            Some(Object::String(s, _)) => assert_eq!(s, b"\x90\x1F\xA0".to_vec()),
            _ => panic!("unexpected {:?}", out),
        }
    }

    #[test]
    fn space_in_startxref_number() {
        let input = b"startxref\n153804 \n%%EOF\n";
        assert_eq!(xref_start(test_span(input)), Some(153804));
    }

    #[test]
    fn big_generation_value() {
        let input = b"xref\n0 1\n0000000000 65536 f \n0 16\n0000000000 65535 f \n0000153238 00000 n \n0000000019 00000 n \n0000000313 00000 n \n0000000333 00000 n \n0000145531 00000 n \n0000153407 00000 n \n0000145554 00000 n \n0000152303 00000 n \n0000152324 00000 n \n0000152514 00000 n \n0000152880 00000 n \n0000153106 00000 n \n0000153139 00000 n \n0000153532 00000 n \n0000153629 00000 n \ntrailer\n<</Size 16/Root 14 0 R\n/Info 15 0 R\n/ID [ <9DDC4B621B3F485FF5ED0F57D00A028F>\n<9DDC4B621B3F485FF5ED0F57D00A028F> ]\n>>\nstartxref\n153804\n%%EOF\n";
        match xref(test_span(input)) {
            Ok((_, re)) => assert_eq!(re.entries.len(), 15),
            Err(err) => panic!("unexpected {:?}", err),
        }
    }

    #[test]
    fn object_stream_header_parses_pairs() {
        let input = b"10 0 11 25 12 58 ";
        let pairs = object_stream_header(test_span(input), 3).unwrap();
        assert_eq!(pairs, vec![(10, 0), (11, 25), (12, 58)]);
    }
}
