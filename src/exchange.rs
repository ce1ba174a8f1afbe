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
    channel_arg, get_parsed, get_path, get_secret_id, path_arg, read_message, secret_id_arg,
    version_arg, write_output, ENCODING_BASE,
};

use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Context, Error};
use clap::{Arg, ArgAction, ArgMatches, Command};

extern crate derec_core;
use derec_core::latest as derec;

use derec::{Share, ShareRequest, ShareResponse, ToWire, VerificationRequest, VerificationResponse};

// derec verify challenge -S <SECRET ID> --secret-version <VERSION>
fn verify_challenge_cli() -> Command {
    Command::new("challenge")
        .about("Create a challenge asking a helper to prove it still holds its share.")
        .arg(secret_id_arg())
        .arg(version_arg())
}

fn verify_challenge(matches: &ArgMatches) -> Result<(), Error> {
    let secret_id = get_secret_id(matches)?;
    let version = get_parsed(matches, "secret-version")?;

    let request = derec::generate_verification_request(&secret_id, version);
    println!("{}", request.to_wire_multibase(ENCODING_BASE));

    Ok(())
}

// derec verify respond -S <SECRET ID> -c <CHANNEL> --share <SHARE> --request <REQUEST>
fn verify_respond_cli() -> Command {
    Command::new("respond")
        .about("Answer a verification challenge (run by the helper).")
        .arg(secret_id_arg())
        .arg(channel_arg())
        .arg(path_arg("share", "share", "share held for this channel"))
        .arg(path_arg("request", "request", "verification request"))
}

fn verify_respond(matches: &ArgMatches) -> Result<(), Error> {
    let secret_id = get_secret_id(matches)?;
    let channel_id = get_parsed(matches, "channel")?;
    let share: Share = read_message("Share", get_path(matches, "share")?)?;
    let request: VerificationRequest =
        read_message("Verification Request", get_path(matches, "request")?)?;

    let response = derec::generate_verification_response(&secret_id, channel_id, &share, &request)
        .context("answer verification request")?;
    println!("{}", response.to_wire_multibase(ENCODING_BASE));

    Ok(())
}

// derec verify check -S <SECRET ID> -c <CHANNEL> --share <SHARE> --response <RESPONSE> [--request <REQUEST>]
fn verify_check_cli() -> Command {
    Command::new("check")
        .about("Check a helper's answer against the sharer's copy of the share.")
        .arg(secret_id_arg())
        .arg(channel_arg())
        .arg(path_arg("share", "share", "share sent to this channel"))
        .arg(path_arg("response", "response", "verification response"))
        .arg(path_arg("request", "request", "verification request that was sent").required(false))
}

fn verify_check(matches: &ArgMatches) -> Result<(), Error> {
    let secret_id = get_secret_id(matches)?;
    let channel_id = get_parsed(matches, "channel")?;
    let share: Share = read_message("Share", get_path(matches, "share")?)?;
    let response: VerificationResponse =
        read_message("Verification Response", get_path(matches, "response")?)?;

    if let Some(request_path) = matches.get_one::<String>("request") {
        let request: VerificationRequest = read_message("Verification Request", request_path)?;
        if !request.is_answered_by(&response) {
            bail!("verification response does not answer this challenge");
        }
    }

    let valid = derec::verify_share_response(&secret_id, channel_id, &share, &response)
        .context("check verification response")?;
    if !valid {
        bail!("helper on channel {} failed verification", channel_id);
    }
    println!("Channel {}: share verified.", channel_id);

    Ok(())
}

pub(crate) fn verify_submatch(app: &mut Command, matches: &ArgMatches) -> Result<(), Error> {
    match matches.subcommand() {
        Some(("challenge", sub_matches)) => verify_challenge(sub_matches),
        Some(("respond", sub_matches)) => verify_respond(sub_matches),
        Some(("check", sub_matches)) => verify_check(sub_matches),
        Some((subcommand, _)) => {
            // We should never end up here.
            app.print_help()?;
            Err(anyhow!("unknown subcommand 'verify {}'", subcommand))
        }
        None => {
            app.print_help()?;
            Err(anyhow!("no 'verify' subcommand specified"))
        }
    }
}

pub(crate) fn verify_subcommands() -> Command {
    Command::new("verify")
        .about("Check that helpers still hold their shares, without revealing them.")
        // derec verify challenge -S <SECRET ID> --secret-version <VERSION>
        .subcommand(verify_challenge_cli())
        // derec verify respond -S <SECRET ID> -c <CHANNEL> --share <SHARE> --request <REQUEST>
        .subcommand(verify_respond_cli())
        // derec verify check -S <SECRET ID> -c <CHANNEL> --share <SHARE> --response <RESPONSE>
        .subcommand(verify_check_cli())
}

// derec recover request -S <SECRET ID> --secret-version <VERSION> -c <CHANNEL>
fn recover_request_cli() -> Command {
    Command::new("request")
        .about("Ask the helper on a channel for its share.")
        .arg(secret_id_arg())
        .arg(version_arg())
        .arg(channel_arg())
}

fn recover_request(matches: &ArgMatches) -> Result<(), Error> {
    let secret_id = get_secret_id(matches)?;
    let version = get_parsed(matches, "secret-version")?;
    let channel_id = get_parsed(matches, "channel")?;

    let request = derec::generate_share_request(channel_id, &secret_id, version);
    println!("{}", request.to_wire_multibase(ENCODING_BASE));

    Ok(())
}

// derec recover respond -S <SECRET ID> -c <CHANNEL> --share <SHARE> --request <REQUEST>
fn recover_respond_cli() -> Command {
    Command::new("respond")
        .about("Answer a share request (run by the helper).")
        .arg(secret_id_arg())
        .arg(channel_arg())
        .arg(path_arg("share", "share", "share held for this channel"))
        .arg(path_arg("request", "request", "share request"))
}

fn recover_respond(matches: &ArgMatches) -> Result<(), Error> {
    let secret_id = get_secret_id(matches)?;
    let channel_id = get_parsed(matches, "channel")?;
    let share: Share = read_message("Share", get_path(matches, "share")?)?;
    let request: ShareRequest = read_message("Share Request", get_path(matches, "request")?)?;

    let response = derec::generate_share_response(&secret_id, channel_id, &share, &request)
        .context("answer share request")?;
    println!("{}", response.to_wire_multibase(ENCODING_BASE));

    Ok(())
}

// derec recover combine -S <SECRET ID> --secret-version <VERSION> (--response <RESPONSE>)... OUTPUT
fn recover_combine_cli() -> Command {
    Command::new("combine")
        .about("Recover the secret from the helpers' share responses.")
        .arg(secret_id_arg())
        .arg(version_arg())
        .arg(
            Arg::new("responses")
                .short('r')
                .long("response")
                .value_name("RESPONSE PATH")
                .help(r#"Path to each share response ("-" to read from stdin)."#)
                .action(ArgAction::Append)
                .allow_hyphen_values(true)
                .required(true),
        )
        .arg(
            Arg::new("OUTPUT")
                .help(r#"Path to write recovered secret data to ("-" to write to stdout)."#)
                .action(ArgAction::Set)
                .allow_hyphen_values(true)
                .required(true)
                .index(1),
        )
}

fn recover_combine(matches: &ArgMatches) -> Result<(), Error> {
    let secret_id = get_secret_id(matches)?;
    let version = get_parsed(matches, "secret-version")?;
    let response_paths = matches
        .get_many::<String>("responses")
        .context("required --response argument not provided")?;
    let output_path = get_path(matches, "OUTPUT")?;

    let mut responses = BTreeMap::new();
    for (idx, response_path) in response_paths.enumerate() {
        let response: ShareResponse =
            read_message(&format!("Share Response {}", idx + 1), response_path)?;
        let channel_id = response.channel_id();
        if responses.insert(channel_id, response).is_some() {
            bail!("more than one share response for channel {}", channel_id);
        }
    }

    let recovery = derec::recover_with_report(&responses, &secret_id, version)
        .context("recovering secret data")?;
    for rejection in recovery.rejected() {
        eprintln!("Ignored share response from {}.", rejection);
    }
    eprintln!("Recovered using channels {:?}.", recovery.used_channels());

    write_output(output_path, recovery.secret())
}

pub(crate) fn recover_submatch(app: &mut Command, matches: &ArgMatches) -> Result<(), Error> {
    match matches.subcommand() {
        Some(("request", sub_matches)) => recover_request(sub_matches),
        Some(("respond", sub_matches)) => recover_respond(sub_matches),
        Some(("combine", sub_matches)) => recover_combine(sub_matches),
        Some((subcommand, _)) => {
            // We should never end up here.
            app.print_help()?;
            Err(anyhow!("unknown subcommand 'recover {}'", subcommand))
        }
        None => {
            app.print_help()?;
            Err(anyhow!("no 'recover' subcommand specified"))
        }
    }
}

pub(crate) fn recover_subcommands() -> Command {
    Command::new("recover")
        .about("Collect shares from helpers and recover the secret.")
        // derec recover request -S <SECRET ID> --secret-version <VERSION> -c <CHANNEL>
        .subcommand(recover_request_cli())
        // derec recover respond -S <SECRET ID> -c <CHANNEL> --share <SHARE> --request <REQUEST>
        .subcommand(recover_respond_cli())
        // derec recover combine -S <SECRET ID> --secret-version <VERSION> (--response <RESPONSE>)... OUTPUT
        .subcommand(recover_combine_cli())
}
