/*
 * derec: decentralized secret recovery protocol core
 * Copyright (C) 2024 derec contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

mod helpers;
mod internal;
mod messages;
mod pairing;
mod share;

use crate::v0::{Error, SecretId, Version};

use nom::{error::Error as NomError, Err as NomErr};
use unsigned_varint::encode as varuint_encode;

pub(crate) mod prefixes {
    // It's easier to read these bytes if they have unconventional groupings.
    #![allow(clippy::unusual_byte_groupings)]

    /// Prefix for an ed25519 public key.
    pub(crate) const PREFIX_ED25519_PUB: u32 = 0xed;

    /// Prefix for an ed25519 signature.
    // NOTE: Not actually upstream -- see multiformats/multicodec#142.
    pub(super) const PREFIX_ED25519_SIG: u32 = 0xef;

    /// Prefix for an x25519 public key.
    pub(super) const PREFIX_X25519_PUB: u32 = 0xec;

    /// Prefix for an x25519 secret key.
    // NOTE: Entirely our own creation and not remotely upstreamable.
    pub(super) const PREFIX_X25519_SECRET: u64 = 0xff_c25519_536b; // "Sk"

    /// Prefix for an ML-KEM-768 encapsulation (public) key.
    pub(super) const PREFIX_MLKEM768_PUB: u64 = 0x120c;

    /// Prefix for an ML-KEM-768 decapsulation (secret) key.
    // NOTE: Entirely our own creation and not remotely upstreamable.
    pub(super) const PREFIX_MLKEM768_SECRET: u64 = 0xff_0768_536b;

    /// Prefix for an ML-KEM-768 ciphertext.
    // NOTE: Entirely our own creation and not remotely upstreamable.
    pub(super) const PREFIX_MLKEM768_CIPHERTEXT: u64 = 0xfc_0768_0000;

    /// Prefix for an ML-KEM-768 shared secret (kept by the requestor between
    /// pairing steps).
    // NOTE: Entirely our own creation and not remotely upstreamable.
    pub(super) const PREFIX_MLKEM768_SHARED: u64 = 0xfd_0768_0000;

    /// Prefix for a ChaCha20-Poly1305 key.
    // NOTE: Entirely our own creation and not remotely upstreamable.
    pub(super) const PREFIX_CHACHA20POLY1305_KEY: u64 = 0xff_caca20_1305;

    /// Prefix for a ChaCha20-Poly1305 nonce.
    // NOTE: Entirely our own creation and not remotely upstreamable.
    pub(super) const PREFIX_CHACHA20POLY1305_NONCE: u64 = 0xfe_caca20_1305;

    /// Prefix for a ChaCha20-Poly1305 ciphertext.
    // NOTE: Entirely our own creation and not remotely upstreamable.
    pub(super) const PREFIX_CHACHA20POLY1305_CIPHERTEXT: u64 = 0xfc_caca20_1305;

    /// Prefix for a HMAC-SHA-384 tag.
    // NOTE: Entirely our own creation and not remotely upstreamable.
    pub(super) const PREFIX_HMAC_SHA384: u64 = 0xfe_5384_ac00;

    /// Prefix for a HMAC-SHA-256 tag.
    // NOTE: Entirely our own creation and not remotely upstreamable.
    pub(super) const PREFIX_HMAC_SHA256: u64 = 0xfe_5256_ac00;

    /// Prefix for a 256-bit request nonce.
    // NOTE: Entirely our own creation and not remotely upstreamable.
    pub(super) const PREFIX_REQUEST_NONCE: u64 = 0xfe_de7ec_0000;

    // Message type prefixes. Every top-level message starts with one of these
    // so that a blob handed to the wrong parser is rejected immediately.
    pub(super) const PREFIX_MSG_SHARE: u64 = 0xff_de7ec_0001;
    pub(super) const PREFIX_MSG_VERIFICATION_REQUEST: u64 = 0xff_de7ec_0002;
    pub(super) const PREFIX_MSG_VERIFICATION_RESPONSE: u64 = 0xff_de7ec_0003;
    pub(super) const PREFIX_MSG_SHARE_REQUEST: u64 = 0xff_de7ec_0004;
    pub(super) const PREFIX_MSG_SHARE_RESPONSE: u64 = 0xff_de7ec_0005;
    pub(super) const PREFIX_MSG_CONTACT: u64 = 0xff_de7ec_0006;
    pub(super) const PREFIX_MSG_PAIR_REQUEST: u64 = 0xff_de7ec_0007;
    pub(super) const PREFIX_MSG_PAIR_RESPONSE: u64 = 0xff_de7ec_0008;
    pub(super) const PREFIX_MSG_PAIRING_SECRET: u64 = 0xff_de7ec_0009;
    pub(super) const PREFIX_MSG_CHANNEL: u64 = 0xff_de7ec_000a;
}

/// Remove whitespace (and, for most bases, `-` separators) that users or
/// transports tend to insert into long multibase strings.
pub fn multibase_strip<S: AsRef<str>>(data: S) -> Result<String, Error> {
    let data = data.as_ref().trim();
    match data.chars().next() {
        Some(ch) => Ok(data.replace(
            match multibase::Base::from_code(ch) {
                // url-base64 -- do not remove "-"
                Ok(multibase::Base::Base64Url) | Ok(multibase::Base::Base64UrlPad) => {
                    &['\t', ' ', '\n', '\r'][..]
                }
                Ok(_) => &['\t', ' ', '\n', '\r', '-'][..],
                Err(err) => {
                    return Err(Error::MalformedMessage(format!(
                        "error parsing multibase string: {}",
                        err
                    )))
                }
            },
            "",
        )),
        None => Err(Error::MalformedMessage(
            "error parsing multibase string: empty string".into(),
        )),
    }
}

/// Convert a nom parse failure of `what` into an `Error::MalformedMessage`.
pub(crate) fn nom_error(what: &'static str) -> impl Fn(NomErr<NomError<&[u8]>>) -> Error {
    move |err| {
        Error::MalformedMessage(match err {
            NomErr::Incomplete(_) => format!("{}: truncated input", what),
            NomErr::Error(err) | NomErr::Failure(err) => {
                format!("{}: invalid encoding ({:?})", what, err.code)
            }
        })
    }
}

pub(crate) fn push_u32(bytes: &mut Vec<u8>, n: u32) {
    bytes.extend_from_slice(varuint_encode::u32(n, &mut varuint_encode::u32_buffer()));
}

pub(crate) fn push_u64(bytes: &mut Vec<u8>, n: u64) {
    bytes.extend_from_slice(varuint_encode::u64(n, &mut varuint_encode::u64_buffer()));
}

/// Append `data` preceded by its length.
pub(crate) fn push_length_prefixed(bytes: &mut Vec<u8>, data: &[u8]) {
    bytes.extend_from_slice(varuint_encode::usize(
        data.len(),
        &mut varuint_encode::usize_buffer(),
    ));
    bytes.extend_from_slice(data);
}

/// Append fixed-length `data` preceded by its type prefix.
pub(crate) fn push_prefixed(bytes: &mut Vec<u8>, prefix: u64, data: &[u8]) {
    push_u64(bytes, prefix);
    bytes.extend_from_slice(data);
}

/// Append a length-prefixed secret id followed by a version, in the order
/// every message uses.
pub(crate) fn push_secret_version(bytes: &mut Vec<u8>, secret_id: &SecretId, version: Version) {
    push_length_prefixed(bytes, secret_id.as_bytes());
    push_u32(bytes, version);
}

pub trait ToWire {
    fn to_wire(&self) -> Vec<u8>;

    /// Convert a `ToWire`-implementing type to a multibase string.
    fn to_wire_multibase(&self, base: multibase::Base) -> String {
        multibase::encode(base, self.to_wire())
    }
}

pub trait FromWire: Sized {
    fn from_wire_partial(input: &[u8]) -> Result<(&[u8], Self), Error>;

    fn from_wire<B: AsRef<[u8]>>(input: B) -> Result<Self, Error> {
        match Self::from_wire_partial(input.as_ref())? {
            ([], ret) => Ok(ret),
            _ => Err(Error::MalformedMessage(
                "trailing bytes left after deseralisation".into(),
            )),
        }
    }

    /// Parse a multibase-encoded representation of a `FromWire`-implementing
    /// type as that type.
    fn from_wire_multibase<S: AsRef<str>>(input: S) -> Result<Self, Error> {
        let (_, data) = multibase::decode(input)
            .map_err(|err| Error::MalformedMessage(format!("invalid multibase: {}", err)))?;
        Self::from_wire(data)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn strip_whitespace() {
        let stripped = multibase_strip("hy-bnd\n8x t\t").unwrap();
        assert_eq!(stripped, "hybnd8xt");
    }

    #[test]
    fn strip_base64url_keeps_dashes() {
        let stripped = multibase_strip("uab-c d").unwrap();
        assert_eq!(stripped, "uab-cd");
    }

    #[test]
    fn strip_empty() {
        assert!(matches!(
            multibase_strip("  \n"),
            Err(Error::MalformedMessage(_))
        ));
    }
}
