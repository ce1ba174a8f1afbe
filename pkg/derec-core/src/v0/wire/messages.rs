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
        wire::{
            helpers::{
                take_chachapoly_ciphertext, take_chachapoly_nonce, take_hmac_sha384,
                take_request_nonce, take_secret_id,
            },
            nom_error,
            prefixes::*,
            push_length_prefixed, push_prefixed, push_secret_version, push_u64, FromWire, ToWire,
        },
        ChannelMessage, Error, SecretId, ShareRequest, ShareResponse, VerificationRequest,
        VerificationResponse, Version,
    },
};

use nom::{combinator::complete, IResult};

fn take_secret_version(input: &[u8]) -> IResult<&[u8], (SecretId, Version)> {
    let (input, secret_id) = take_secret_id(input)?;
    let (input, version) = nom_helpers::u32(input)?;

    Ok((input, (secret_id, version)))
}

impl ToWire for VerificationRequest {
    fn to_wire(&self) -> Vec<u8> {
        let mut bytes = vec![];

        push_u64(&mut bytes, PREFIX_MSG_VERIFICATION_REQUEST);
        push_secret_version(&mut bytes, &self.secret_id, self.version);
        push_prefixed(&mut bytes, PREFIX_REQUEST_NONCE, &self.nonce);

        bytes
    }
}

impl FromWire for VerificationRequest {
    fn from_wire_partial(input: &[u8]) -> Result<(&[u8], Self), Error> {
        fn parse(input: &[u8]) -> IResult<&[u8], VerificationRequest> {
            let (input, _) = nom_helpers::u64_tag(PREFIX_MSG_VERIFICATION_REQUEST)(input)?;
            let (input, (secret_id, version)) = take_secret_version(input)?;
            let (input, nonce) = take_request_nonce(input)?;

            Ok((
                input,
                VerificationRequest {
                    secret_id,
                    version,
                    nonce,
                },
            ))
        }

        complete(parse)(input).map_err(nom_error("verification request"))
    }
}

impl ToWire for VerificationResponse {
    fn to_wire(&self) -> Vec<u8> {
        let mut bytes = vec![];

        push_u64(&mut bytes, PREFIX_MSG_VERIFICATION_RESPONSE);
        push_secret_version(&mut bytes, &self.secret_id, self.version);
        push_u64(&mut bytes, self.channel_id);
        push_prefixed(&mut bytes, PREFIX_REQUEST_NONCE, &self.nonce);
        push_prefixed(&mut bytes, PREFIX_HMAC_SHA384, &self.tag);

        bytes
    }
}

impl FromWire for VerificationResponse {
    fn from_wire_partial(input: &[u8]) -> Result<(&[u8], Self), Error> {
        fn parse(input: &[u8]) -> IResult<&[u8], VerificationResponse> {
            let (input, _) = nom_helpers::u64_tag(PREFIX_MSG_VERIFICATION_RESPONSE)(input)?;
            let (input, (secret_id, version)) = take_secret_version(input)?;
            let (input, channel_id) = nom_helpers::u64(input)?;
            let (input, nonce) = take_request_nonce(input)?;
            let (input, tag) = take_hmac_sha384(input)?;

            Ok((
                input,
                VerificationResponse {
                    secret_id,
                    channel_id,
                    version,
                    nonce,
                    tag,
                },
            ))
        }

        complete(parse)(input).map_err(nom_error("verification response"))
    }
}

impl ToWire for ShareRequest {
    fn to_wire(&self) -> Vec<u8> {
        let mut bytes = vec![];

        push_u64(&mut bytes, PREFIX_MSG_SHARE_REQUEST);
        push_u64(&mut bytes, self.channel_id);
        push_secret_version(&mut bytes, &self.secret_id, self.version);
        push_prefixed(&mut bytes, PREFIX_REQUEST_NONCE, &self.nonce);

        bytes
    }
}

impl FromWire for ShareRequest {
    fn from_wire_partial(input: &[u8]) -> Result<(&[u8], Self), Error> {
        fn parse(input: &[u8]) -> IResult<&[u8], ShareRequest> {
            let (input, _) = nom_helpers::u64_tag(PREFIX_MSG_SHARE_REQUEST)(input)?;
            let (input, channel_id) = nom_helpers::u64(input)?;
            let (input, (secret_id, version)) = take_secret_version(input)?;
            let (input, nonce) = take_request_nonce(input)?;

            Ok((
                input,
                ShareRequest {
                    channel_id,
                    secret_id,
                    version,
                    nonce,
                },
            ))
        }

        complete(parse)(input).map_err(nom_error("share request"))
    }
}

impl ToWire for ShareResponse {
    fn to_wire(&self) -> Vec<u8> {
        let mut bytes = vec![];

        push_u64(&mut bytes, PREFIX_MSG_SHARE_RESPONSE);
        push_u64(&mut bytes, self.channel_id);
        push_secret_version(&mut bytes, &self.secret_id, self.version);
        push_prefixed(&mut bytes, PREFIX_REQUEST_NONCE, &self.request_nonce);
        push_length_prefixed(&mut bytes, &self.share);
        bytes.append(&mut self.binding.to_bytes());

        bytes
    }
}

impl FromWire for ShareResponse {
    fn from_wire_partial(input: &[u8]) -> Result<(&[u8], Self), Error> {
        fn parse(input: &[u8]) -> IResult<&[u8], ShareResponse> {
            let (input, _) = nom_helpers::u64_tag(PREFIX_MSG_SHARE_RESPONSE)(input)?;
            let (input, channel_id) = nom_helpers::u64(input)?;
            let (input, (secret_id, version)) = take_secret_version(input)?;
            let (input, request_nonce) = take_request_nonce(input)?;
            let (input, share) = nom_helpers::length_prefixed(input)?;
            let (input, binding) = nom_helpers::multihash(input)?;

            Ok((
                input,
                ShareResponse {
                    channel_id,
                    secret_id,
                    version,
                    request_nonce,
                    share: share.into(),
                    binding,
                },
            ))
        }

        complete(parse)(input).map_err(nom_error("share response"))
    }
}

impl ToWire for ChannelMessage {
    fn to_wire(&self) -> Vec<u8> {
        let mut bytes = vec![];

        push_u64(&mut bytes, PREFIX_MSG_CHANNEL);
        push_prefixed(&mut bytes, PREFIX_CHACHA20POLY1305_NONCE, &self.nonce);
        push_u64(&mut bytes, PREFIX_CHACHA20POLY1305_CIPHERTEXT);
        push_length_prefixed(&mut bytes, &self.ciphertext);

        bytes
    }
}

impl FromWire for ChannelMessage {
    fn from_wire_partial(input: &[u8]) -> Result<(&[u8], Self), Error> {
        fn parse(input: &[u8]) -> IResult<&[u8], ChannelMessage> {
            let (input, _) = nom_helpers::u64_tag(PREFIX_MSG_CHANNEL)(input)?;
            let (input, nonce) = take_chachapoly_nonce(input)?;
            let (input, ciphertext) = take_chachapoly_ciphertext(input)?;

            Ok((
                input,
                ChannelMessage {
                    nonce,
                    ciphertext: ciphertext.into(),
                },
            ))
        }

        complete(parse)(input).map_err(nom_error("channel message"))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::v0::{arbitrary_fill_slice, ChaChaPolyNonce, CHECKSUM_ALGORITHM};

    use multihash_codetable::MultihashDigest;
    use quickcheck::{Arbitrary, Gen};

    fn nonce(g: &mut Gen) -> [u8; 32] {
        let mut nonce = [0u8; 32];
        arbitrary_fill_slice(g, &mut nonce);
        nonce
    }

    impl Arbitrary for VerificationRequest {
        fn arbitrary(g: &mut Gen) -> Self {
            Self {
                secret_id: SecretId::arbitrary(g),
                version: Version::arbitrary(g),
                nonce: nonce(g),
            }
        }
    }

    impl Arbitrary for VerificationResponse {
        fn arbitrary(g: &mut Gen) -> Self {
            let mut tag = [0u8; 48];
            arbitrary_fill_slice(g, &mut tag);
            Self {
                secret_id: SecretId::arbitrary(g),
                channel_id: u64::arbitrary(g),
                version: Version::arbitrary(g),
                nonce: nonce(g),
                tag,
            }
        }
    }

    impl Arbitrary for ShareRequest {
        fn arbitrary(g: &mut Gen) -> Self {
            Self {
                channel_id: u64::arbitrary(g),
                secret_id: SecretId::arbitrary(g),
                version: Version::arbitrary(g),
                nonce: nonce(g),
            }
        }
    }

    impl Arbitrary for ShareResponse {
        fn arbitrary(g: &mut Gen) -> Self {
            let share = Vec::<u8>::arbitrary(g);
            Self {
                channel_id: u64::arbitrary(g),
                secret_id: SecretId::arbitrary(g),
                version: Version::arbitrary(g),
                request_nonce: nonce(g),
                binding: CHECKSUM_ALGORITHM.digest(&share),
                share,
            }
        }
    }

    impl Arbitrary for ChannelMessage {
        fn arbitrary(g: &mut Gen) -> Self {
            let mut nonce = ChaChaPolyNonce::default();
            arbitrary_fill_slice(g, &mut nonce);
            Self {
                nonce,
                ciphertext: Vec::<u8>::arbitrary(g),
            }
        }
    }

    #[quickcheck]
    fn verification_request_roundtrip(request: VerificationRequest) {
        let request2 = VerificationRequest::from_wire(request.to_wire()).unwrap();
        assert_eq!(request, request2);
    }

    #[quickcheck]
    fn verification_response_roundtrip(response: VerificationResponse) {
        let response2 = VerificationResponse::from_wire(response.to_wire()).unwrap();
        assert_eq!(response, response2);
    }

    #[quickcheck]
    fn share_request_roundtrip(request: ShareRequest) {
        let request2 = ShareRequest::from_wire(request.to_wire()).unwrap();
        assert_eq!(request, request2);
    }

    #[quickcheck]
    fn share_response_multibase_roundtrip(response: ShareResponse) {
        let encoded = response.to_wire_multibase(multibase::Base::Base32Z);
        let response2 = ShareResponse::from_wire_multibase(encoded).unwrap();
        assert_eq!(response, response2);
    }

    #[quickcheck]
    fn channel_message_roundtrip(message: ChannelMessage) {
        let message2 = ChannelMessage::from_wire(message.to_wire()).unwrap();
        assert_eq!(message, message2);
    }

    // Messages carry their type, so handing one to the wrong parser fails.
    #[quickcheck]
    fn wrong_message_type(request: ShareRequest) -> bool {
        matches!(
            VerificationRequest::from_wire(request.to_wire()),
            Err(Error::MalformedMessage(_))
        )
    }

    #[quickcheck]
    fn truncated_rejected(response: VerificationResponse, cut: usize) -> bool {
        let bytes = response.to_wire();
        let cut = cut % bytes.len();
        matches!(
            VerificationResponse::from_wire(&bytes[..cut]),
            Err(Error::MalformedMessage(_))
        )
    }

    #[test]
    fn empty_secret_id_rejected() {
        let mut bytes = vec![];
        push_u64(&mut bytes, PREFIX_MSG_VERIFICATION_REQUEST);
        push_length_prefixed(&mut bytes, b"");
        bytes.push(1);
        push_prefixed(&mut bytes, PREFIX_REQUEST_NONCE, &[0u8; 32]);
        assert!(VerificationRequest::from_wire(bytes).is_err());
    }
}
