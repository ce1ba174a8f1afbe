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

use std::time::Duration;

use derec_core::{
    shamir::{recover_secret, Dealer, GfElem},
    v0::{protect_secret, SecretId},
};

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rand::{distributions::Standard, rngs::OsRng, Rng};

fn random_secret(len: usize) -> Vec<u8> {
    rand::thread_rng()
        .sample_iter(Standard)
        .take(len)
        .collect::<Vec<u8>>()
}

fn benchmark_dealer_shard(c: &mut Criterion) {
    let mut group = c.benchmark_group("shamir Dealer::shard");
    for threshold in (10..=40).step_by(10) {
        let vec = random_secret(1 << 12);
        let dealer = Dealer::new(threshold, &vec, &mut OsRng).unwrap();
        group.measurement_time(Duration::new(30, 0));
        group.throughput(Throughput::Bytes(vec.len() as u64));
        group.bench_with_input(format!("t={:03}", threshold), &dealer, |b, dealer| {
            b.iter(|| dealer.shard(GfElem::new_rand_nonzero(&mut OsRng)))
        });
    }
    group.finish()
}

fn benchmark_recover_secret(c: &mut Criterion) {
    let mut group = c.benchmark_group("shamir recover_secret");
    for threshold in (5..=65).step_by(10) {
        let vec = random_secret(1 << 12);
        let dealer = Dealer::new(threshold, &vec, &mut OsRng).unwrap();
        let shards = (1..=threshold)
            .map(|x| dealer.shard(GfElem::from_bytes_partial(&x.to_le_bytes()).0))
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        group.throughput(Throughput::Bytes(vec.len() as u64));
        group.measurement_time(Duration::new(20 + threshold as u64, 0));
        group.bench_with_input(format!("t={:03}", threshold), &shards, |b, shards| {
            b.iter(|| black_box(recover_secret(shards).unwrap()))
        });
    }
    group.finish()
}

fn benchmark_protect_secret(c: &mut Criterion) {
    let mut group = c.benchmark_group("v0 protect_secret");
    let secret_id = SecretId::new(b"benchmark".to_vec()).unwrap();
    for helpers in [3u64, 10, 30] {
        let vec = random_secret(1 << 10);
        let channels = (0..helpers).collect::<Vec<_>>();
        let threshold = (helpers / 2 + 1) as u32;
        group.throughput(Throughput::Bytes(vec.len() as u64));
        group.bench_with_input(format!("n={:02}", helpers), &vec, |b, vec| {
            b.iter(|| black_box(protect_secret(&secret_id, vec, &channels, threshold, 1).unwrap()))
        });
    }
    group.finish()
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(100);
    targets = benchmark_dealer_shard, benchmark_recover_secret, benchmark_protect_secret
}
criterion_main!(benches);
