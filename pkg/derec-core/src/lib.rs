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

#![forbid(unsafe_code)]

#[cfg(test)]
extern crate quickcheck;
#[cfg(test)]
#[macro_use]
extern crate quickcheck_macros;

/// Varint and multihash parsers for nom.
mod nom_helpers;

/// Implementation of Shamir Secret Sharing.
#[cfg(not(feature = "donotuse_expose_internal_modules"))]
mod shamir;

// Expose the module so we can benchmark it with criterion. This feature is only enabled as a
// dev-dependency.
#[cfg(feature = "donotuse_expose_internal_modules")]
pub mod shamir;

/// Initial version of the derec protocol types.
///
/// This module contains the secret protection engine, the verification and
/// recovery exchanges, the pairing handshake and all of the code necessary to
/// serialise the messages passed between sharers and helpers.
pub mod v0;

/// Re-export of the newest derec protocol types.
pub use v0 as latest;
