//! OpenSSH private key container parsing.
//!
//! `ssh-key` turns a container into a signing key, but the agent also wants
//! the comment the key was generated with so that `ssh-add -l` shows
//! something useful.  The comment lives inside the private section of the
//! container, after the key material:
//!
//! ```text
//! "openssh-key-v1\0"
//! string  ciphername
//! string  kdfname
//! string  kdfoptions
//! uint32  number of keys (always 1)
//! string  public key
//! string  private section:
//!     uint32  checkint
//!     uint32  checkint
//!     string  key type
//!     ...     key-type specific fields, all length-prefixed
//!     string  comment
//!     byte[]  padding 1, 2, 3, ... up to the cipher block size
//! ```
//!
//! The comment is cosmetic, so every inconsistency in the layout yields an
//! empty comment rather than an error.

use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use zeroize::Zeroizing;

const AUTH_MAGIC: &[u8] = b"openssh-key-v1\0";
const BEGIN_MARKER: &str = "-----BEGIN ";
const END_MARKER: &str = "-----END ";

/// Extract the comment from a PEM-encoded OpenSSH private key.
///
/// Returns `""` if the key has no comment, is encrypted, or cannot be read.
pub fn parse_comment(pem: &[u8]) -> String {
    decode_pem(pem)
        .and_then(|blob| container_comment(&blob))
        .unwrap_or_default()
}

/// Decode the base64 body of the first PEM block in `pem`.
pub fn decode_pem(pem: &[u8]) -> Option<Zeroizing<Vec<u8>>> {
    let text = std::str::from_utf8(pem).ok()?;

    let begin = text.find(BEGIN_MARKER)?;
    let after_begin = &text[begin..];
    let body_start = after_begin.find('\n')? + 1;
    let body = &after_begin[body_start..];
    let body = &body[..body.find(END_MARKER)?];

    let encoded: Zeroizing<String> =
        Zeroizing::new(body.chars().filter(|c| !c.is_ascii_whitespace()).collect());
    B64.decode(encoded.as_bytes()).ok().map(Zeroizing::new)
}

/// Find the comment in a decoded `openssh-key-v1` container.
fn container_comment(blob: &[u8]) -> Option<String> {
    let mut r = Reader::new(blob.strip_prefix(AUTH_MAGIC)?);

    let cipher = r.string()?;
    if cipher != b"none" {
        // The private section is ciphertext.
        return None;
    }
    r.string()?; // kdfname
    r.string()?; // kdfoptions
    if r.u32()? != 1 {
        return None;
    }
    r.string()?; // public key

    let private = strip_padding(r.string()?);
    last_field(private.get(8..)?).map(|c| String::from_utf8_lossy(c).into_owned())
}

/// Drop the trailing `1, 2, ..., n` block padding (n < 8), if present.
fn strip_padding(section: &[u8]) -> &[u8] {
    let Some(&n) = section.last() else {
        return section;
    };
    if !(1..8).contains(&n) {
        return section;
    }
    let n = usize::from(n);
    let Some(start) = section.len().checked_sub(n) else {
        return section;
    };
    let pad = &section[start..];
    if pad.iter().zip(1u8..).all(|(&b, want)| b == want) {
        &section[..start]
    } else {
        section
    }
}

/// Walk a run of length-prefixed fields and return the body of the last one.
///
/// The fields must exactly fill `fields`; any overrun yields `None`.
fn last_field(mut fields: &[u8]) -> Option<&[u8]> {
    loop {
        let mut r = Reader::new(fields);
        let body = r.string()?;
        if r.is_empty() {
            return Some(body);
        }
        fields = r.rest();
    }
}

/// Bounds-checked cursor over SSH wire encoding.
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn u32(&mut self) -> Option<u32> {
        let (head, rest) = self.buf.split_first_chunk::<4>()?;
        self.buf = rest;
        Some(u32::from_be_bytes(*head))
    }

    fn string(&mut self) -> Option<&'a [u8]> {
        let len = usize::try_from(self.u32()?).ok()?;
        if len > self.buf.len() {
            return None;
        }
        let (body, rest) = self.buf.split_at(len);
        self.buf = rest;
        Some(body)
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn rest(&self) -> &'a [u8] {
        self.buf
    }
}
