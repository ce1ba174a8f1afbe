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

mod exchange;
mod pair;

use std::{
    error::Error as StdError,
    fs::{self, File},
    io,
    io::{prelude::*, BufReader},
    path::Path,
    str::FromStr,
};

use anyhow::{anyhow, Context, Error};
use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing_subscriber::EnvFilter;

extern crate derec_core;
use derec_core::latest as derec;

use derec::{FromWire, SecretId, ToWire};

pub(crate) const ENCODING_BASE: multibase::Base = multibase::Base::Base32Z;

pub(crate) fn secret_id_arg() -> Arg {
    Arg::new("secret-id")
        .short('S')
        .long("secret-id")
        .value_name("SECRET ID")
        .help("Identifier of the protected secret (stable across re-splitting).")
        .action(ArgAction::Set)
        .required(true)
}

pub(crate) fn version_arg() -> Arg {
    Arg::new("secret-version")
        .long("secret-version")
        .value_name("VERSION")
        .help("Version of the split.")
        .action(ArgAction::Set)
        .required(true)
}

pub(crate) fn channel_arg() -> Arg {
    Arg::new("channel")
        .short('c')
        .long("channel")
        .value_name("CHANNEL ID")
        .help("Identifier of the channel to the helper.")
        .action(ArgAction::Set)
        .required(true)
}

pub(crate) fn path_arg(name: &'static str, long: &'static str, what: &str) -> Arg {
    Arg::new(name)
        .long(long)
        .value_name("PATH")
        .help(format!(r#"Path to the {} ("-" to read from stdin)."#, what))
        .action(ArgAction::Set)
        .allow_hyphen_values(true)
        .required(true)
}

pub(crate) fn get_parsed<T>(matches: &ArgMatches, name: &str) -> Result<T, Error>
where
    T: FromStr,
    T::Err: StdError + Send + Sync + 'static,
{
    matches
        .get_one::<String>(name)
        .with_context(|| format!("required --{} argument not provided", name))?
        .parse()
        .with_context(|| format!("--{} argument was not an unsigned integer", name))
}

pub(crate) fn get_path<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str, Error> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .with_context(|| format!("required {} argument not provided", name))
}

pub(crate) fn get_secret_id(matches: &ArgMatches) -> Result<SecretId, Error> {
    let secret_id = matches
        .get_one::<String>("secret-id")
        .context("required --secret-id argument not provided")?;
    SecretId::new(secret_id.as_bytes()).context("invalid --secret-id argument")
}

pub(crate) fn read_oneline_file(prompt: &str, path_or_stdin: &str) -> Result<String, Error> {
    let (mut stdin_reader, mut file_reader);
    let input: &mut dyn Read = if path_or_stdin == "-" {
        eprint!("{}: ", prompt);
        io::stderr().flush()?;
        stdin_reader = io::stdin();
        &mut stdin_reader
    } else {
        file_reader = File::open(path_or_stdin)
            .with_context(|| format!("failed to open file '{}'", path_or_stdin))?;
        &mut file_reader
    };
    let buffer_input = BufReader::new(input);
    Ok(buffer_input
        .lines()
        .next()
        .ok_or_else(|| anyhow!("no lines read"))??)
}

/// Read a multibase-encoded message from `path_or_stdin`.
pub(crate) fn read_message<T: FromWire>(what: &str, path_or_stdin: &str) -> Result<T, Error> {
    let data = read_oneline_file(what, path_or_stdin).with_context(|| format!("read {}", what))?;
    let data = derec::multibase_strip(data)
        .with_context(|| format!("strip non-multibase characters from {}", what))?;
    T::from_wire_multibase(data).with_context(|| format!("decode {}", what))
}

pub(crate) fn write_message<T: ToWire>(path: &Path, message: &T) -> Result<(), Error> {
    fs::write(path, message.to_wire_multibase(ENCODING_BASE) + "\n")
        .with_context(|| format!("failed to write '{}'", path.display()))
}

pub(crate) fn read_input(path_or_stdin: &str) -> Result<Vec<u8>, Error> {
    let (mut stdin_reader, mut file_reader);
    let input: &mut dyn Read = if path_or_stdin == "-" {
        stdin_reader = io::stdin();
        &mut stdin_reader
    } else {
        file_reader = File::open(path_or_stdin)
            .with_context(|| format!("failed to open input file '{}'", path_or_stdin))?;
        &mut file_reader
    };

    let mut data = Vec::new();
    BufReader::new(input)
        .read_to_end(&mut data)
        .with_context(|| format!("failed to read data from '{}'", path_or_stdin))?;
    Ok(data)
}

pub(crate) fn write_output(path_or_stdout: &str, data: &[u8]) -> Result<(), Error> {
    let (mut stdout_writer, mut file_writer);
    let output_file: &mut dyn Write = if path_or_stdout == "-" {
        stdout_writer = io::stdout();
        &mut stdout_writer
    } else {
        file_writer = File::create(path_or_stdout).with_context(|| {
            format!("failed to open output file '{}' for writing", path_or_stdout)
        })?;
        &mut file_writer
    };

    output_file
        .write_all(data)
        .with_context(|| format!("write data to '{}'", path_or_stdout))
}

// derec protect -S <SECRET ID> --secret-version <VERSION> -t <THRESHOLD> (-c <CHANNEL>)... [-o <DIR>] INPUT
fn protect_cli() -> Command {
    Command::new("protect")
        .about("Split a secret into one share per helper channel.")
        .arg(secret_id_arg())
        .arg(version_arg())
        .arg(Arg::new("threshold")
            .short('t')
            .long("threshold")
            .value_name("THRESHOLD")
            .help("Number of shares required to recover the secret (must not be larger than the number of channels).")
            .action(ArgAction::Set)
            .required(true))
        .arg(Arg::new("channels")
            .short('c')
            .long("channel")
            .value_name("CHANNEL ID")
            .help("Channel to create a share for (repeat once per helper).")
            .action(ArgAction::Append)
            .required(true))
        .arg(Arg::new("output-dir")
            .short('o')
            .long("output-dir")
            .value_name("DIR")
            .help("Also write each share to <DIR>/share-<CHANNEL ID>.txt.")
            .action(ArgAction::Set))
        .arg(Arg::new("INPUT")
            .help(r#"Path to file containing secret data to protect ("-" to read from stdin)."#)
            .action(ArgAction::Set)
            .allow_hyphen_values(true)
            .required(true)
            .index(1))
}

fn protect(matches: &ArgMatches) -> Result<(), Error> {
    let secret_id = get_secret_id(matches)?;
    let version = get_parsed(matches, "secret-version")?;
    let threshold = get_parsed(matches, "threshold")?;
    let channels = matches
        .get_many::<String>("channels")
        .context("required --channel argument not provided")?
        .map(|channel| {
            channel
                .parse()
                .with_context(|| format!("--channel '{}' was not an unsigned integer", channel))
        })
        .collect::<Result<Vec<_>, Error>>()?;
    let output_dir = matches.get_one::<String>("output-dir").map(Path::new);
    let input_path = get_path(matches, "INPUT")?;

    let secret = read_input(input_path)?;
    let shares = derec::protect_secret(&secret_id, &secret, &channels, threshold, version)
        .context("protect secret")?;

    let total = shares.len();
    for (i, (channel_id, share)) in shares.iter().enumerate() {
        println!("----- BEGIN SHARE {} OF {} -----", i + 1, total);
        println!("Secret-ID: {}", share.secret_id());
        println!("Version: {}", share.version());
        println!("Channel: {}", channel_id);
        println!("Shard-ID: {}", share.id());
        println!(
            "Checksum: {}",
            multibase::encode(ENCODING_BASE, share.ciphertext_checksum().to_bytes())
        );
        println!("\n{}", share.to_wire_multibase(ENCODING_BASE));
        println!("----- END SHARE {} OF {} -----", i + 1, total);

        if let Some(dir) = output_dir {
            write_message(&dir.join(format!("share-{}.txt", channel_id)), share)?;
        }
    }

    Ok(())
}

fn cli() -> Command {
    Command::new("derec")
        .version("0.0.0")
        .author("derec contributors")
        .about("Split, verify, recover and pair for decentralized secret recovery.")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log more details to stderr (repeat for even more). RUST_LOG takes precedence.")
                .action(ArgAction::Count)
                .global(true),
        )
        // derec protect -S <SECRET ID> --secret-version <VERSION> -t <THRESHOLD> (-c <CHANNEL>)... INPUT
        .subcommand(protect_cli())
        // derec verify (challenge|respond|check) ...
        .subcommand(exchange::verify_subcommands())
        // derec recover (request|respond|combine) ...
        .subcommand(exchange::recover_subcommands())
        // derec pair (contact|request|respond|finish) ...
        .subcommand(pair::pair_subcommands())
        // derec channel (encrypt|decrypt) ...
        .subcommand(pair::channel_subcommands())
}

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

fn main() -> Result<(), Box<dyn StdError>> {
    let mut app = cli();
    let matches = app.get_matches_mut();

    init_logging(matches.get_count("verbose"));

    let ret = match matches.subcommand() {
        Some(("protect", sub_matches)) => protect(sub_matches),
        Some(("verify", sub_matches)) => exchange::verify_submatch(&mut app, sub_matches),
        Some(("recover", sub_matches)) => exchange::recover_submatch(&mut app, sub_matches),
        Some(("pair", sub_matches)) => pair::pair_submatch(&mut app, sub_matches),
        Some(("channel", sub_matches)) => pair::channel_submatch(&mut app, sub_matches),
        Some((subcommand, _)) => {
            // We should never end up here.
            app.print_help()?;
            Err(anyhow!("unknown subcommand '{}'", subcommand))
        }
        None => {
            app.print_help()?;
            Err(anyhow!("no subcommand specified"))
        }
    }?;

    Ok(ret)
}

#[test]
fn verify_cli() {
    cli().debug_assert();
}
