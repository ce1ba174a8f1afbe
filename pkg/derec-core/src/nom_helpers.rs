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

use multihash::Multihash;
use nom::{
    bytes::streaming::take,
    error::{Error as NomError, ErrorKind},
    Err as NomErr, IResult, Needed,
};
use unsigned_varint::decode::{self, Error};

// unsigned-varint only ships nom glue for an older nom error type, so we
// adapt its plain decoders to nom 7 ourselves.
macro_rules! gen {
    ($($name:ident, $name_tag:ident, $t:ident);*) => {
        $(
            pub(crate) fn $name(input: &[u8]) -> IResult<&[u8], $t> {
                let (n, remain) = decode::$t(input).map_err(|err| match err {
                    Error::Insufficient => NomErr::Incomplete(Needed::Unknown),
                    _ => NomErr::Error(NomError::new(input, ErrorKind::TooLarge)),
                })?;
                Ok((remain, n))
            }

            #[allow(dead_code)]
            pub(crate) fn $name_tag(tag: $t) -> impl Fn(&[u8]) -> IResult<&[u8], $t> {
                move |input: &[u8]| match $name(input)? {
                    (remain, n) if n == tag => Ok((remain, tag)),
                    _ => Err(NomErr::Error(NomError::new(input, ErrorKind::Tag))),
                }
            }
        )*
    }
}

gen! {
    u8,    u8_tag,    u8;
    u32,   u32_tag,   u32;
    u64,   u64_tag,   u64;
    usize, usize_tag, usize
}

/// Parse a varint length prefix followed by that many bytes.
///
/// The length is checked against the remaining input before anything is
/// allocated, so a hostile prefix can't make us reserve gigabytes.
pub(crate) fn length_prefixed(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, length) = usize(input)?;
    if length > input.len() {
        return Err(NomErr::Incomplete(Needed::new(length - input.len())));
    }
    take(length)(input)
}

/// Parse a varint element count, rejecting counts that could not possibly fit
/// in the remaining input (every element is at least one byte long).
pub(crate) fn element_count(input: &[u8]) -> IResult<&[u8], usize> {
    let (remain, count) = usize(input)?;
    if count > remain.len() {
        return Err(NomErr::Error(NomError::new(input, ErrorKind::TooLarge)));
    }
    Ok((remain, count))
}

pub(crate) fn multihash(input: &[u8]) -> IResult<&[u8], Multihash<64>> {
    use nom::sequence::pair;

    // Annoyingly, mulithash doesn't let you partially-read a slice so we
    // have to manually decode the length (the second parameter).
    let (partial, (_, length)) = pair(u64, usize)(input)?;

    // The length doesn't include the (type, length) prefix, so calculate that
    // based on the partially-parsed input.
    let length = length.saturating_add(input.len() - partial.len());
    if length > input.len() {
        return Err(NomErr::Incomplete(Needed::new(length - input.len())));
    }
    let (hash, remain) = input.split_at(length);

    let hash = Multihash::<64>::from_bytes(hash)
        .map_err(|_| NomErr::Error(NomError::new(input, ErrorKind::Tag)))?;
    Ok((remain, hash))
}

#[cfg(test)]
mod test {
    use super::*;

    use unsigned_varint::encode as varuint_encode;

    #[quickcheck]
    fn u64_roundtrip(n: u64) -> bool {
        let mut buffer = varuint_encode::u64_buffer();
        let bytes = varuint_encode::u64(n, &mut buffer);
        matches!(u64(bytes), Ok(([], m)) if m == n)
    }

    #[test]
    fn tag_mismatch() {
        let mut buffer = varuint_encode::u32_buffer();
        let bytes = varuint_encode::u32(0xed, &mut buffer);
        assert!(u32_tag(0xed)(bytes).is_ok());
        assert!(u32_tag(0xef)(bytes).is_err());
    }

    #[test]
    fn hostile_length_prefix() {
        let mut buffer = varuint_encode::usize_buffer();
        let mut bytes = varuint_encode::usize(1 << 40, &mut buffer).to_vec();
        bytes.extend_from_slice(b"short");
        assert!(length_prefixed(&bytes).is_err());
        assert!(element_count(&bytes).is_err());
    }
}
