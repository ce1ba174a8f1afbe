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
        pairing::PairingKeys,
        wire::{
            helpers::{
                take_array, take_hmac_sha256, take_mlkem_ciphertext,
                take_mlkem_decapsulation_key, take_mlkem_encapsulation_key, take_mlkem_shared,
                take_role, take_string, take_x25519_pub, take_x25519_secret,
            },
            nom_error,
            prefixes::*,
            push_length_prefixed, push_prefixed, push_u32, push_u64, FromWire, ToWire,
        },
        ContactMessage, Error, PairRequestMessage, PairResponseMessage, PairingSecretKeyMaterial,
    },
};

use nom::{branch::alt, combinator::complete, IResult};
use zeroize::Zeroizing;

const KEYS_CONTACTOR: u8 = 0;
const KEYS_REQUESTOR: u8 = 1;

impl ToWire for ContactMessage {
    fn to_wire(&self) -> Vec<u8> {
        let mut bytes = vec![];

        push_u64(&mut bytes, PREFIX_MSG_CONTACT);
        push_u64(&mut bytes, self.channel_id);
        push_length_prefixed(&mut bytes, self.transport_uri.as_bytes());
        push_u64(&mut bytes, self.nonce);
        push_prefixed(
            &mut bytes,
            PREFIX_MLKEM768_PUB,
            &self.mlkem_encapsulation_key,
        );
        push_u32(&mut bytes, PREFIX_X25519_PUB);
        bytes.extend_from_slice(self.x25519_public_key.as_bytes());

        bytes
    }
}

impl FromWire for ContactMessage {
    fn from_wire_partial(input: &[u8]) -> Result<(&[u8], Self), Error> {
        fn parse(input: &[u8]) -> IResult<&[u8], ContactMessage> {
            let (input, _) = nom_helpers::u64_tag(PREFIX_MSG_CONTACT)(input)?;
            let (input, channel_id) = nom_helpers::u64(input)?;
            let (input, transport_uri) = take_string(input)?;
            let (input, nonce) = nom_helpers::u64(input)?;
            let (input, mlkem_encapsulation_key) = take_mlkem_encapsulation_key(input)?;
            let (input, x25519_public_key) = take_x25519_pub(input)?;

            Ok((
                input,
                ContactMessage {
                    channel_id,
                    transport_uri,
                    nonce,
                    mlkem_encapsulation_key: mlkem_encapsulation_key.into(),
                    x25519_public_key,
                },
            ))
        }

        complete(parse)(input).map_err(nom_error("contact message"))
    }
}

impl ToWire for PairRequestMessage {
    fn to_wire(&self) -> Vec<u8> {
        let mut bytes = vec![];

        push_u64(&mut bytes, PREFIX_MSG_PAIR_REQUEST);
        push_u64(&mut bytes, self.channel_id);
        bytes.push(self.sender_role.wire_code());
        push_u64(&mut bytes, self.nonce);
        push_prefixed(
            &mut bytes,
            PREFIX_MLKEM768_CIPHERTEXT,
            &self.mlkem_ciphertext,
        );
        push_u32(&mut bytes, PREFIX_X25519_PUB);
        bytes.extend_from_slice(self.x25519_public_key.as_bytes());

        bytes
    }
}

impl FromWire for PairRequestMessage {
    fn from_wire_partial(input: &[u8]) -> Result<(&[u8], Self), Error> {
        fn parse(input: &[u8]) -> IResult<&[u8], PairRequestMessage> {
            let (input, _) = nom_helpers::u64_tag(PREFIX_MSG_PAIR_REQUEST)(input)?;
            let (input, channel_id) = nom_helpers::u64(input)?;
            let (input, sender_role) = take_role(input)?;
            let (input, nonce) = nom_helpers::u64(input)?;
            let (input, mlkem_ciphertext) = take_mlkem_ciphertext(input)?;
            let (input, x25519_public_key) = take_x25519_pub(input)?;

            Ok((
                input,
                PairRequestMessage {
                    channel_id,
                    sender_role,
                    nonce,
                    mlkem_ciphertext: mlkem_ciphertext.into(),
                    x25519_public_key,
                },
            ))
        }

        complete(parse)(input).map_err(nom_error("pair request"))
    }
}

impl ToWire for PairResponseMessage {
    fn to_wire(&self) -> Vec<u8> {
        let mut bytes = vec![];

        push_u64(&mut bytes, PREFIX_MSG_PAIR_RESPONSE);
        push_u64(&mut bytes, self.channel_id);
        bytes.push(self.sender_role.wire_code());
        push_u64(&mut bytes, self.nonce);
        push_prefixed(&mut bytes, PREFIX_HMAC_SHA256, &self.confirmation);

        bytes
    }
}

impl FromWire for PairResponseMessage {
    fn from_wire_partial(input: &[u8]) -> Result<(&[u8], Self), Error> {
        fn parse(input: &[u8]) -> IResult<&[u8], PairResponseMessage> {
            let (input, _) = nom_helpers::u64_tag(PREFIX_MSG_PAIR_RESPONSE)(input)?;
            let (input, channel_id) = nom_helpers::u64(input)?;
            let (input, sender_role) = take_role(input)?;
            let (input, nonce) = nom_helpers::u64(input)?;
            let (input, confirmation) = take_hmac_sha256(input)?;

            Ok((
                input,
                PairResponseMessage {
                    channel_id,
                    sender_role,
                    nonce,
                    confirmation,
                },
            ))
        }

        complete(parse)(input).map_err(nom_error("pair response"))
    }
}

impl ToWire for PairingSecretKeyMaterial {
    fn to_wire(&self) -> Vec<u8> {
        let mut bytes = vec![];

        push_u64(&mut bytes, PREFIX_MSG_PAIRING_SECRET);
        push_u64(&mut bytes, self.channel_id);
        push_u64(&mut bytes, self.nonce);

        match &self.keys {
            PairingKeys::Contactor {
                mlkem_decapsulation_key,
                x25519_secret,
                contact_digest,
            } => {
                bytes.push(KEYS_CONTACTOR);
                push_prefixed(
                    &mut bytes,
                    PREFIX_MLKEM768_SECRET,
                    mlkem_decapsulation_key,
                );
                push_prefixed(
                    &mut bytes,
                    PREFIX_X25519_SECRET,
                    &Zeroizing::new(x25519_secret.to_bytes())[..],
                );
                bytes.extend_from_slice(contact_digest);
            }
            PairingKeys::Requestor {
                role,
                mlkem_shared_secret,
                x25519_secret,
                contact_digest,
                request_digest,
            } => {
                bytes.push(KEYS_REQUESTOR);
                bytes.push(role.wire_code());
                push_prefixed(&mut bytes, PREFIX_MLKEM768_SHARED, &mlkem_shared_secret[..]);
                push_prefixed(
                    &mut bytes,
                    PREFIX_X25519_SECRET,
                    &Zeroizing::new(x25519_secret.to_bytes())[..],
                );
                bytes.extend_from_slice(contact_digest);
                bytes.extend_from_slice(request_digest);
            }
        }

        bytes
    }
}

impl FromWire for PairingSecretKeyMaterial {
    fn from_wire_partial(input: &[u8]) -> Result<(&[u8], Self), Error> {
        fn contactor(input: &[u8]) -> IResult<&[u8], PairingKeys> {
            let (input, _) = nom_helpers::u8_tag(KEYS_CONTACTOR)(input)?;
            let (input, mlkem_decapsulation_key) = take_mlkem_decapsulation_key(input)?;
            let (input, x25519_secret) = take_x25519_secret(input)?;
            let (input, contact_digest) = take_array::<32>(input)?;

            Ok((
                input,
                PairingKeys::Contactor {
                    mlkem_decapsulation_key: Zeroizing::new(mlkem_decapsulation_key.into()),
                    x25519_secret,
                    contact_digest,
                },
            ))
        }

        fn requestor(input: &[u8]) -> IResult<&[u8], PairingKeys> {
            let (input, _) = nom_helpers::u8_tag(KEYS_REQUESTOR)(input)?;
            let (input, role) = take_role(input)?;
            let (input, mlkem_shared_secret) = take_mlkem_shared(input)?;
            let (input, x25519_secret) = take_x25519_secret(input)?;
            let (input, contact_digest) = take_array::<32>(input)?;
            let (input, request_digest) = take_array::<32>(input)?;

            Ok((
                input,
                PairingKeys::Requestor {
                    role,
                    mlkem_shared_secret: Zeroizing::new(mlkem_shared_secret),
                    x25519_secret,
                    contact_digest,
                    request_digest,
                },
            ))
        }

        fn parse(input: &[u8]) -> IResult<&[u8], PairingSecretKeyMaterial> {
            let (input, _) = nom_helpers::u64_tag(PREFIX_MSG_PAIRING_SECRET)(input)?;
            let (input, channel_id) = nom_helpers::u64(input)?;
            let (input, nonce) = nom_helpers::u64(input)?;
            let (input, keys) = alt((contactor, requestor))(input)?;

            Ok((
                input,
                PairingSecretKeyMaterial {
                    channel_id,
                    nonce,
                    keys,
                },
            ))
        }

        complete(parse)(input).map_err(nom_error("pairing key material"))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::v0::{
        create_contact_message_with_rng, produce_pairing_request_message_with_rng,
        produce_pairing_response_message, Role,
    };

    use rand::{rngs::StdRng, SeedableRng};

    fn handshake(
        seed: u64,
        channel_id: u64,
    ) -> (
        ContactMessage,
        PairRequestMessage,
        PairResponseMessage,
        PairingSecretKeyMaterial,
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let (contact, contact_material) =
            create_contact_message_with_rng(channel_id, "derec://helper.example", &mut rng);
        let (request, request_material) =
            produce_pairing_request_message_with_rng(channel_id, Role::Sharer, &contact, &mut rng)
                .unwrap();
        let (response, _) =
            produce_pairing_response_message(Role::Helper, &request, &contact_material).unwrap();
        (contact, request, response, request_material)
    }

    #[quickcheck]
    fn pairing_messages_roundtrip(seed: u64, channel_id: u64) {
        let (contact, request, response, material) = handshake(seed, channel_id);

        assert_eq!(ContactMessage::from_wire(contact.to_wire()).unwrap(), contact);
        assert_eq!(PairRequestMessage::from_wire(request.to_wire()).unwrap(), request);
        assert_eq!(PairResponseMessage::from_wire(response.to_wire()).unwrap(), response);
        assert_eq!(
            PairingSecretKeyMaterial::from_wire(material.to_wire()).unwrap(),
            material
        );
    }

    #[test]
    fn contact_multibase_roundtrip() {
        let (contact, ..) = handshake(1, 9);
        let encoded = contact.to_wire_multibase(multibase::Base::Base32Z);
        assert_eq!(ContactMessage::from_wire_multibase(encoded).unwrap(), contact);
    }

    #[test]
    fn unknown_role_rejected() {
        let (_, _, response, _) = handshake(2, 9);
        let mut bytes = response.to_wire();
        // The role byte follows the message type and the channel id.
        let mut prefix = vec![];
        push_u64(&mut prefix, PREFIX_MSG_PAIR_RESPONSE);
        push_u64(&mut prefix, 9);
        let role_idx = prefix.len();
        assert_eq!(bytes[role_idx], Role::Helper.wire_code());
        bytes[role_idx] = 7;
        assert!(matches!(
            PairResponseMessage::from_wire(bytes),
            Err(Error::MalformedMessage(_))
        ));
    }

    #[test]
    fn short_mlkem_key_rejected() {
        let (contact, ..) = handshake(3, 9);
        let bytes = contact.to_wire();
        // Drop the tail of the encapsulation key and the x25519 key.
        assert!(matches!(
            ContactMessage::from_wire(&bytes[..bytes.len() - 64]),
            Err(Error::MalformedMessage(_))
        ));
    }
}
