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

use crate::{
    nom_helpers,
    v0::{
        pairing::{Role, MLKEM_CIPHERTEXT_LENGTH, MLKEM_DECAPSULATION_KEY_LENGTH,
            MLKEM_ENCAPSULATION_KEY_LENGTH},
        wire::prefixes::*,
        ChaChaPolyKey, ChaChaPolyNonce, SecretId, CHACHAPOLY_KEY_LENGTH, CHACHAPOLY_NONCE_LENGTH,
        REQUEST_NONCE_LENGTH,
    },
};

use ed25519_dalek::{Signature, SignatureError, VerifyingKey};
use nom::{
    bytes::streaming::take,
    combinator::{map, map_opt, map_res},
    IResult,
};

/// Take exactly `N` bytes.
pub(super) fn take_array<const N: usize>(input: &[u8]) -> IResult<&[u8], [u8; N]> {
    let (input, bytes) = take(N)(input)?;
    let mut array = [0u8; N];
    array.copy_from_slice(bytes);
    Ok((input, array))
}

/// Take a type prefix followed by exactly `N` bytes.
fn take_prefixed<const N: usize>(prefix: u64) -> impl Fn(&[u8]) -> IResult<&[u8], [u8; N]> {
    move |input: &[u8]| {
        let (input, _) = nom_helpers::u64_tag(prefix)(input)?;
        take_array::<N>(input)
    }
}

pub(super) fn take_ed25519_pub(
    input: &[u8],
) -> IResult<&[u8], Result<VerifyingKey, SignatureError>> {
    let (input, _) = nom_helpers::u32_tag(PREFIX_ED25519_PUB)(input)?;
    let (input, public_key) = take_array::<{ ed25519_dalek::PUBLIC_KEY_LENGTH }>(input)?;

    Ok((input, VerifyingKey::from_bytes(&public_key)))
}

pub(super) fn take_ed25519_sig(input: &[u8]) -> IResult<&[u8], Signature> {
    let (input, _) = nom_helpers::u32_tag(PREFIX_ED25519_SIG)(input)?;
    let (input, signature) = take_array::<{ ed25519_dalek::SIGNATURE_LENGTH }>(input)?;

    Ok((input, Signature::from_bytes(&signature)))
}

pub(super) fn take_x25519_pub(input: &[u8]) -> IResult<&[u8], x25519_dalek::PublicKey> {
    let (input, _) = nom_helpers::u32_tag(PREFIX_X25519_PUB)(input)?;
    map(take_array::<32>, x25519_dalek::PublicKey::from)(input)
}

pub(super) fn take_x25519_secret(input: &[u8]) -> IResult<&[u8], x25519_dalek::StaticSecret> {
    map(
        take_prefixed::<32>(PREFIX_X25519_SECRET),
        x25519_dalek::StaticSecret::from,
    )(input)
}

pub(super) fn take_mlkem_encapsulation_key(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, _) = nom_helpers::u64_tag(PREFIX_MLKEM768_PUB)(input)?;
    take(MLKEM_ENCAPSULATION_KEY_LENGTH)(input)
}

pub(super) fn take_mlkem_decapsulation_key(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, _) = nom_helpers::u64_tag(PREFIX_MLKEM768_SECRET)(input)?;
    take(MLKEM_DECAPSULATION_KEY_LENGTH)(input)
}

pub(super) fn take_mlkem_ciphertext(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, _) = nom_helpers::u64_tag(PREFIX_MLKEM768_CIPHERTEXT)(input)?;
    take(MLKEM_CIPHERTEXT_LENGTH)(input)
}

pub(super) fn take_mlkem_shared(input: &[u8]) -> IResult<&[u8], [u8; 32]> {
    take_prefixed::<32>(PREFIX_MLKEM768_SHARED)(input)
}

pub(super) fn take_chachapoly_key(input: &[u8]) -> IResult<&[u8], ChaChaPolyKey> {
    let (input, _) = nom_helpers::u64_tag(PREFIX_CHACHA20POLY1305_KEY)(input)?;
    let (input, key) = take(CHACHAPOLY_KEY_LENGTH)(input)?;

    Ok((input, *ChaChaPolyKey::from_slice(key)))
}

pub(super) fn take_chachapoly_nonce(input: &[u8]) -> IResult<&[u8], ChaChaPolyNonce> {
    let (input, _) = nom_helpers::u64_tag(PREFIX_CHACHA20POLY1305_NONCE)(input)?;
    let (input, nonce) = take(CHACHAPOLY_NONCE_LENGTH)(input)?;

    Ok((input, *ChaChaPolyNonce::from_slice(nonce)))
}

pub(super) fn take_chachapoly_ciphertext(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, _) = nom_helpers::u64_tag(PREFIX_CHACHA20POLY1305_CIPHERTEXT)(input)?;
    nom_helpers::length_prefixed(input)
}

pub(super) fn take_request_nonce(input: &[u8]) -> IResult<&[u8], [u8; REQUEST_NONCE_LENGTH]> {
    take_prefixed::<REQUEST_NONCE_LENGTH>(PREFIX_REQUEST_NONCE)(input)
}

pub(super) fn take_hmac_sha384(input: &[u8]) -> IResult<&[u8], [u8; 48]> {
    take_prefixed::<48>(PREFIX_HMAC_SHA384)(input)
}

pub(super) fn take_hmac_sha256(input: &[u8]) -> IResult<&[u8], [u8; 32]> {
    take_prefixed::<32>(PREFIX_HMAC_SHA256)(input)
}

pub(super) fn take_secret_id(input: &[u8]) -> IResult<&[u8], SecretId> {
    map_opt(nom_helpers::length_prefixed, |id: &[u8]| SecretId::new(id).ok())(input)
}

pub(super) fn take_string(input: &[u8]) -> IResult<&[u8], String> {
    map(
        map_res(nom_helpers::length_prefixed, std::str::from_utf8),
        str::to_owned,
    )(input)
}

pub(super) fn take_role(input: &[u8]) -> IResult<&[u8], Role> {
    map_opt(nom_helpers::u8, Role::from_wire_code)(input)
}
