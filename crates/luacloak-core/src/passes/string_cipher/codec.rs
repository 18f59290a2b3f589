//! String literal codec: byte decoding of Lua literals, the XOR cipher and
//! the variable-radix payload encoding read back by the emitted decoder.

use crate::error::{ObfuscateError, Result};
use crate::lexer::is_space;
use rand::seq::SliceRandom;
use rand::Rng;

/// Symbols available for keys, alphabets and delimiters. None of them needs
/// escaping inside a double-quoted Lua string.
pub const SYMBOL_POOL: &[u8] =
    b"!#$%&()*+,-.:;<=>?@[]^_{}~0123456789ABCDEFGHJKLMNOPQRSTUVWXYZ";

const MIN_KEY_LENGTH: usize = 5;
const MAX_KEY_LENGTH: usize = 40;
const MIN_ALPHABET_SIZE: usize = 16;
const DELIMITER_SYMBOLS: usize = 4;

/// Prepended to the ciphertext before the radix conversion so leading zero
/// bytes survive it.
const SENTINEL: u8 = 0x01;

/// One enciphered literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherPayload {
    pub key: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub alphabet: Vec<u8>,
    pub digits: Vec<u8>,
    pub delimiter: Vec<u8>,
}

impl CipherPayload {
    pub fn encode<R: Rng + ?Sized>(plain: &[u8], rng: &mut R) -> Self {
        let key_length = rng.gen_range(MIN_KEY_LENGTH..=MAX_KEY_LENGTH);
        let key: Vec<u8> = SYMBOL_POOL.choose_multiple(rng, key_length).copied().collect();

        let size = rng.gen_range(MIN_ALPHABET_SIZE..=SYMBOL_POOL.len());
        let alphabet: Vec<u8> = SYMBOL_POOL.choose_multiple(rng, size).copied().collect();

        let mut delimiter: Vec<u8> = SYMBOL_POOL
            .choose_multiple(rng, DELIMITER_SYMBOLS)
            .copied()
            .collect();
        delimiter.push(rng.gen_range(b'a'..=b'z'));

        let ciphertext = xor(plain, &key);
        let mut number = Vec::with_capacity(ciphertext.len() + 1);
        number.push(SENTINEL);
        number.extend_from_slice(&ciphertext);
        let digits = to_radix(&number, alphabet.len() as u32)
            .into_iter()
            .map(|digit| alphabet[digit as usize])
            .collect();

        Self {
            key,
            ciphertext,
            alphabet,
            digits,
            delimiter,
        }
    }

    /// `delimiter alphabet delimiter digits`, the first decoder argument.
    pub fn payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            self.delimiter.len() * 2 + self.alphabet.len() + self.digits.len(),
        );
        out.extend_from_slice(&self.delimiter);
        out.extend_from_slice(&self.alphabet);
        out.extend_from_slice(&self.delimiter);
        out.extend_from_slice(&self.digits);
        out
    }
}

/// Recover the plain bytes from a payload and key, as the Lua decoder does.
pub fn decode(payload: &[u8], key: &[u8]) -> Option<Vec<u8>> {
    let delimiter = payload.get(..DELIMITER_SYMBOLS + 1)?;
    let rest = &payload[delimiter.len()..];
    let end = rest
        .windows(delimiter.len())
        .position(|window| window == delimiter)?;
    let alphabet = &rest[..end];
    let digits = rest[end + delimiter.len()..]
        .iter()
        .map(|symbol| alphabet.iter().position(|a| a == symbol).map(|d| d as u32))
        .collect::<Option<Vec<_>>>()?;
    let number = from_radix(&digits, alphabet.len() as u32);
    let (&sentinel, ciphertext) = number.split_first()?;
    if sentinel != SENTINEL {
        return None;
    }
    Some(xor(ciphertext, key))
}

pub fn xor(bytes: &[u8], key: &[u8]) -> Vec<u8> {
    if key.is_empty() {
        return bytes.to_vec();
    }
    bytes
        .iter()
        .zip(key.iter().cycle())
        .map(|(byte, k)| byte ^ k)
        .collect()
}

/// Big-endian base-256 number to big-endian digits in `base`.
fn to_radix(bytes: &[u8], base: u32) -> Vec<u32> {
    let mut number: Vec<u32> = bytes
        .iter()
        .skip_while(|&&b| b == 0)
        .map(|&b| u32::from(b))
        .collect();
    let mut digits = Vec::new();
    while !number.is_empty() {
        let mut remainder = 0u32;
        let mut quotient = Vec::with_capacity(number.len());
        for &byte in &number {
            let current = remainder * 256 + byte;
            let q = current / base;
            remainder = current % base;
            if !(quotient.is_empty() && q == 0) {
                quotient.push(q);
            }
        }
        digits.push(remainder);
        number = quotient;
    }
    if digits.is_empty() {
        digits.push(0);
    }
    digits.reverse();
    digits
}

/// Big-endian digits in `base` to a big-endian base-256 number.
fn from_radix(digits: &[u32], base: u32) -> Vec<u8> {
    let mut bytes: Vec<u32> = vec![0];
    for &digit in digits {
        let mut carry = digit;
        for byte in bytes.iter_mut().rev() {
            let value = *byte * base + carry;
            *byte = value % 256;
            carry = value / 256;
        }
        while carry > 0 {
            bytes.insert(0, carry % 256);
            carry /= 256;
        }
    }
    bytes.into_iter().map(|b| b as u8).collect()
}

/// The bytes a string literal denotes.
pub fn decode_literal(raw: &str) -> Result<Vec<u8>> {
    let invalid = |why: &str| ObfuscateError::InvalidStringLiteral(format!("{}: {}", why, raw));
    let bytes = raw.as_bytes();

    if bytes.first() == Some(&b'[') {
        let level = bytes[1..].iter().take_while(|&&b| b == b'=').count();
        let open = level + 2;
        let close = level + 2;
        if bytes.len() < open + close || bytes.get(open - 1) != Some(&b'[') {
            return Err(invalid("malformed long string"));
        }
        let content = &bytes[open..bytes.len() - close];
        // the first newline is not part of the string
        let content = &content[line_break_length(content)..];
        let mut out = Vec::with_capacity(content.len());
        let mut i = 0;
        while i < content.len() {
            match line_break_length(&content[i..]) {
                0 => {
                    out.push(content[i]);
                    i += 1;
                }
                length => {
                    out.push(b'\n');
                    i += length;
                }
            }
        }
        return Ok(out);
    }

    let (&quote, inner) = bytes.split_first().ok_or_else(|| invalid("empty literal"))?;
    let inner = match inner.split_last() {
        Some((&last, inner)) if last == quote && (quote == b'"' || quote == b'\'') => inner,
        _ => return Err(invalid("unterminated literal")),
    };

    let mut out = Vec::with_capacity(inner.len());
    let mut i = 0;
    while i < inner.len() {
        let byte = inner[i];
        if byte != b'\\' {
            out.push(byte);
            i += 1;
            continue;
        }
        let escape = *inner.get(i + 1).ok_or_else(|| invalid("dangling escape"))?;
        i += 2;
        match escape {
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'v' => out.push(0x0b),
            b'\\' | b'"' | b'\'' => out.push(escape),
            b'\n' | b'\r' => {
                out.push(b'\n');
                i += line_break_length(&inner[i - 1..]) - 1;
            }
            b'x' => {
                let hex = inner
                    .get(i..i + 2)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| invalid("bad \\x escape"))?;
                out.push(hex);
                i += 2;
            }
            b'z' => {
                while inner.get(i).is_some_and(|&b| is_space(b)) {
                    i += 1;
                }
            }
            b'u' => {
                if inner.get(i) != Some(&b'{') {
                    return Err(invalid("bad \\u escape"));
                }
                let start = i + 1;
                let end = inner[start..]
                    .iter()
                    .position(|&b| b == b'}')
                    .map(|offset| start + offset)
                    .ok_or_else(|| invalid("unterminated \\u escape"))?;
                let code = std::str::from_utf8(&inner[start..end])
                    .ok()
                    .and_then(|h| u32::from_str_radix(h, 16).ok())
                    .filter(|&c| c < 0x8000_0000)
                    .ok_or_else(|| invalid("bad \\u escape"))?;
                encode_utf8(code, &mut out);
                i = end + 1;
            }
            b'0'..=b'9' => {
                let mut value = u32::from(escape - b'0');
                let mut taken = 1;
                while taken < 3 {
                    match inner.get(i) {
                        Some(&d) if d.is_ascii_digit() => {
                            value = value * 10 + u32::from(d - b'0');
                            i += 1;
                            taken += 1;
                        }
                        _ => break,
                    }
                }
                let value = u8::try_from(value).map_err(|_| invalid("decimal escape too large"))?;
                out.push(value);
            }
            _ => return Err(invalid("invalid escape")),
        }
    }
    Ok(out)
}

/// Length of the line break starting `bytes`: `\r\n` and `\n\r` are one
/// break, as in Lua's lexer. Zero when `bytes` does not start with one.
fn line_break_length(bytes: &[u8]) -> usize {
    match bytes {
        [first @ (b'\n' | b'\r'), second @ (b'\n' | b'\r'), ..] if first != second => 2,
        [b'\n' | b'\r', ..] => 1,
        _ => 0,
    }
}

/// UTF-8 with the extended 5 and 6 byte forms Lua accepts in `\u{...}`.
fn encode_utf8(code: u32, out: &mut Vec<u8>) {
    if code < 0x80 {
        out.push(code as u8);
        return;
    }
    let mut tail = Vec::with_capacity(5);
    let mut rest = code;
    // largest value that still fits in the first byte
    let mut first_limit = 0x3f;
    while rest > first_limit {
        tail.push(0x80 | (rest & 0x3f) as u8);
        rest >>= 6;
        first_limit >>= 1;
    }
    let marker = !((first_limit << 1) | 1) as u8;
    out.push(marker | rest as u8);
    out.extend(tail.into_iter().rev());
}
