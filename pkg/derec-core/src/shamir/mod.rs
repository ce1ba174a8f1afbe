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

//! This package implements a Shamir Secret Sharing scheme in GF(2^32), meaning
//! that the data is split up into 4-byte chunks (and all x and y values are
//! 32-bit integers). Each shard is evaluated at a caller-chosen x value, which
//! lets the protocol layer tie a shard to the channel it was dealt to.
//!
//! ## Security ##
//! **This implementation has not been reviewed by any cryptographers.** The
//! field multiplication is written to avoid data-dependent branches, but the
//! interpolation code makes no such promise.

mod dealer;
mod gf;
pub(crate) mod shard;

pub use dealer::{recover_secret, Dealer};
pub use gf::{GfElem, GfElemPrimitive};
pub use shard::Shard;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("lagrange interpolation failed: {0}")]
    LagrangeError(#[from] gf::Error),

    #[error("threshold must be at least 1")]
    InvalidThreshold,

    #[error("shards cannot be dealt at x = 0 (that is the secret itself)")]
    ZeroPoint,

    #[error("need at least {needed} shards to recover the secret but only have {num_shards}")]
    NotEnoughShards { needed: usize, num_shards: usize },

    #[error("shards are not from the same secret: {0}")]
    MismatchedShards(&'static str),

    /// Indices (into the slice passed to `recover_secret`) of the shards which
    /// do not lie on the polynomials interpolated from the leading shards.
    #[error("shards at positions {0:?} disagree with the interpolated secret")]
    InconsistentShards(Vec<usize>),
}
