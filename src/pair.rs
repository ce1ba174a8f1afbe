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
    channel_arg, get_parsed, get_path, path_arg, read_input, read_message, read_oneline_file,
    write_message, write_output, ENCODING_BASE,
};

use std::{fs, path::Path};

use anyhow::{anyhow, bail, Context, Error};
use clap::{Arg, ArgAction, ArgMatches, Command};

extern crate derec_core;
use derec_core::latest as derec;

use derec::{
    ChannelMessage, ContactMessage, PairRequestMessage, PairResponseMessage,
    PairingSecretKeyMaterial, PairingSharedKey, Role, ToWire,
};

fn role_arg() -> Arg {
    Arg::new("role")
        .short('r')
        .long("role")
        .value_name("ROLE")
        .help("Which side of the relationship we are.")
        .value_parser(["sharer", "helper"])
        .action(ArgAction::Set)
        .required(true)
}

fn get_role(matches: &ArgMatches) -> Result<Role, Error> {
    match matches
        .get_one::<String>("role")
        .context("required --role argument not provided")?
        .as_str()
    {
        "sharer" => Ok(Role::Sharer),
        "helper" => Ok(Role::Helper),
        role => bail!("unknown role '{}'", role),
    }
}

fn out_arg(name: &'static str, long: &'static str, what: &str) -> Arg {
    Arg::new(name)
        .long(long)
        .value_name("PATH")
        .help(format!("Path to write the {} to. Keep it secret.", what))
        .action(ArgAction::Set)
        .required(true)
}

fn write_shared_key(path: &str, key: &PairingSharedKey) -> Result<(), Error> {
    fs::write(path, multibase::encode(ENCODING_BASE, key.as_bytes()) + "\n")
        .with_context(|| format!("failed to write shared key to '{}'", path))
}

fn read_shared_key(path_or_stdin: &str) -> Result<PairingSharedKey, Error> {
    let data = derec::multibase_strip(read_oneline_file("Shared Key", path_or_stdin)?)
        .context("strip non-multibase characters from shared key")?;
    let (_, bytes) = multibase::decode(data).context("decode shared key")?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|bytes: Vec<u8>| anyhow!("shared key must be 32 bytes not {}", bytes.len()))?;
    Ok(PairingSharedKey::from_bytes(bytes))
}

// derec pair contact -c <CHANNEL> --uri <URI> --secret-out <PATH>
fn pair_contact_cli() -> Command {
    Command::new("contact")
        .about("Start a pairing by creating a contact message to show the other party.")
        .arg(channel_arg())
        .arg(
            Arg::new("uri")
                .short('u')
                .long("uri")
                .value_name("URI")
                .help("Where the other party can reach us.")
                .action(ArgAction::Set)
                .required(true),
        )
        .arg(out_arg("secret-out", "secret-out", "pairing key material"))
}

fn pair_contact(matches: &ArgMatches) -> Result<(), Error> {
    let channel_id = get_parsed(matches, "channel")?;
    let transport_uri = get_path(matches, "uri")?;
    let secret_out = get_path(matches, "secret-out")?;

    let (contact, material) = derec::create_contact_message(channel_id, transport_uri);
    write_message(Path::new(secret_out), &material)?;
    println!("{}", contact.to_wire_multibase(ENCODING_BASE));

    Ok(())
}

// derec pair request -c <CHANNEL> -r <ROLE> --contact <CONTACT> --secret-out <PATH>
fn pair_request_cli() -> Command {
    Command::new("request")
        .about("Answer a contact message with a pair request.")
        .arg(channel_arg())
        .arg(role_arg())
        .arg(path_arg("contact", "contact", "contact message"))
        .arg(out_arg("secret-out", "secret-out", "pairing key material"))
}

fn pair_request(matches: &ArgMatches) -> Result<(), Error> {
    let channel_id = get_parsed(matches, "channel")?;
    let role = get_role(matches)?;
    let contact: ContactMessage = read_message("Contact Message", get_path(matches, "contact")?)?;
    let secret_out = get_path(matches, "secret-out")?;

    eprintln!("Pairing with {} on channel {}.", contact.transport_uri(), channel_id);
    let (request, material) = derec::produce_pairing_request_message(channel_id, role, &contact)
        .context("produce pair request")?;
    write_message(Path::new(secret_out), &material)?;
    println!("{}", request.to_wire_multibase(ENCODING_BASE));

    Ok(())
}

// derec pair respond -r <ROLE> --request <REQUEST> --secret <SECRET> --key-out <PATH>
fn pair_respond_cli() -> Command {
    Command::new("respond")
        .about("Answer a pair request and derive the shared key (run by the contactor).")
        .arg(role_arg())
        .arg(path_arg("request", "request", "pair request"))
        .arg(path_arg("secret", "secret", "key material from 'pair contact'"))
        .arg(out_arg("key-out", "key-out", "shared key"))
}

fn pair_respond(matches: &ArgMatches) -> Result<(), Error> {
    let role = get_role(matches)?;
    let request: PairRequestMessage = read_message("Pair Request", get_path(matches, "request")?)?;
    let material: PairingSecretKeyMaterial =
        read_message("Pairing Key Material", get_path(matches, "secret")?)?;
    let key_out = get_path(matches, "key-out")?;

    let (response, key) = derec::produce_pairing_response_message(role, &request, &material)
        .context("produce pair response")?;
    write_shared_key(key_out, &key)?;
    println!("{}", response.to_wire_multibase(ENCODING_BASE));

    Ok(())
}

// derec pair finish --contact <CONTACT> --response <RESPONSE> --secret <SECRET> --key-out <PATH>
fn pair_finish_cli() -> Command {
    Command::new("finish")
        .about("Check the pair response and derive the shared key (run by the requestor).")
        .arg(path_arg("contact", "contact", "contact message"))
        .arg(path_arg("response", "response", "pair response"))
        .arg(path_arg("secret", "secret", "key material from 'pair request'"))
        .arg(out_arg("key-out", "key-out", "shared key"))
}

fn pair_finish(matches: &ArgMatches) -> Result<(), Error> {
    let contact: ContactMessage = read_message("Contact Message", get_path(matches, "contact")?)?;
    let response: PairResponseMessage =
        read_message("Pair Response", get_path(matches, "response")?)?;
    let material: PairingSecretKeyMaterial =
        read_message("Pairing Key Material", get_path(matches, "secret")?)?;
    let key_out = get_path(matches, "key-out")?;

    let key = derec::process_pairing_response_message(&contact, &response, &material)
        .context("process pair response")?;
    write_shared_key(key_out, &key)?;
    eprintln!(
        "Paired with the {} on channel {}.",
        response.sender_role(),
        response.channel_id()
    );

    Ok(())
}

pub(crate) fn pair_submatch(app: &mut Command, matches: &ArgMatches) -> Result<(), Error> {
    match matches.subcommand() {
        Some(("contact", sub_matches)) => pair_contact(sub_matches),
        Some(("request", sub_matches)) => pair_request(sub_matches),
        Some(("respond", sub_matches)) => pair_respond(sub_matches),
        Some(("finish", sub_matches)) => pair_finish(sub_matches),
        Some((subcommand, _)) => {
            // We should never end up here.
            app.print_help()?;
            Err(anyhow!("unknown subcommand 'pair {}'", subcommand))
        }
        None => {
            app.print_help()?;
            Err(anyhow!("no 'pair' subcommand specified"))
        }
    }
}

pub(crate) fn pair_subcommands() -> Command {
    Command::new("pair")
        .about("Establish a shared key with another party.")
        // derec pair contact -c <CHANNEL> --uri <URI> --secret-out <PATH>
        .subcommand(pair_contact_cli())
        // derec pair request -c <CHANNEL> -r <ROLE> --contact <CONTACT> --secret-out <PATH>
        .subcommand(pair_request_cli())
        // derec pair respond -r <ROLE> --request <REQUEST> --secret <SECRET> --key-out <PATH>
        .subcommand(pair_respond_cli())
        // derec pair finish --contact <CONTACT> --response <RESPONSE> --secret <SECRET> --key-out <PATH>
        .subcommand(pair_finish_cli())
}

// derec channel encrypt -c <CHANNEL> --key <KEY> INPUT
fn channel_encrypt_cli() -> Command {
    Command::new("encrypt")
        .about("Encrypt a payload for a paired channel.")
        .arg(channel_arg())
        .arg(path_arg("key", "key", "shared key"))
        .arg(
            Arg::new("INPUT")
                .help(r#"Path to the payload ("-" to read from stdin)."#)
                .action(ArgAction::Set)
                .allow_hyphen_values(true)
                .required(true)
                .index(1),
        )
}

fn channel_encrypt(matches: &ArgMatches) -> Result<(), Error> {
    let channel_id = get_parsed(matches, "channel")?;
    let key = read_shared_key(get_path(matches, "key")?)?;
    let payload = read_input(get_path(matches, "INPUT")?)?;

    let message = derec::encrypt_message(&key, channel_id, &payload)
        .context("encrypt channel message")?;
    println!("{}", message.to_wire_multibase(ENCODING_BASE));

    Ok(())
}

// derec channel decrypt -c <CHANNEL> --key <KEY> --message <MESSAGE> OUTPUT
fn channel_decrypt_cli() -> Command {
    Command::new("decrypt")
        .about("Decrypt a payload received on a paired channel.")
        .arg(channel_arg())
        .arg(path_arg("key", "key", "shared key"))
        .arg(path_arg("message", "message", "channel message"))
        .arg(
            Arg::new("OUTPUT")
                .help(r#"Path to write the payload to ("-" to write to stdout)."#)
                .action(ArgAction::Set)
                .allow_hyphen_values(true)
                .required(true)
                .index(1),
        )
}

fn channel_decrypt(matches: &ArgMatches) -> Result<(), Error> {
    let channel_id = get_parsed(matches, "channel")?;
    let key = read_shared_key(get_path(matches, "key")?)?;
    let message: ChannelMessage = read_message("Channel Message", get_path(matches, "message")?)?;

    let payload = derec::decrypt_message(&key, channel_id, &message)
        .context("decrypt channel message")?;
    write_output(get_path(matches, "OUTPUT")?, &payload)
}

pub(crate) fn channel_submatch(app: &mut Command, matches: &ArgMatches) -> Result<(), Error> {
    match matches.subcommand() {
        Some(("encrypt", sub_matches)) => channel_encrypt(sub_matches),
        Some(("decrypt", sub_matches)) => channel_decrypt(sub_matches),
        Some((subcommand, _)) => {
            // We should never end up here.
            app.print_help()?;
            Err(anyhow!("unknown subcommand 'channel {}'", subcommand))
        }
        None => {
            app.print_help()?;
            Err(anyhow!("no 'channel' subcommand specified"))
        }
    }
}

pub(crate) fn channel_subcommands() -> Command {
    Command::new("channel")
        .about("Encrypt and decrypt payloads under a paired channel's shared key.")
        // derec channel encrypt -c <CHANNEL> --key <KEY> INPUT
        .subcommand(channel_encrypt_cli())
        // derec channel decrypt -c <CHANNEL> --key <KEY> --message <MESSAGE> OUTPUT
        .subcommand(channel_decrypt_cli())
}
