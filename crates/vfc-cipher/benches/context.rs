use std::sync::Arc;
use vfc_cipher::{AesCipher, CipherContext, CipherRegistry};
use vfc_core::Algorithm;

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

fn keyed() -> CipherContext {
    let mut ctx = CipherContext::bind(Arc::new(AesCipher::portable())).unwrap();
    ctx.set_key(&[0x42u8; 32]).unwrap();
    ctx
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_cbc_encrypt(bencher: divan::Bencher, size: usize) {
    let mut ctx = keyed();
    let mut data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench_local(|| ctx.encrypt_in_place(divan::black_box(&mut data)).unwrap());
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_cbc_decrypt(bencher: divan::Bencher, size: usize) {
    let mut ctx = keyed();
    let mut data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench_local(|| ctx.decrypt_in_place(divan::black_box(&mut data)).unwrap());
}

#[divan::bench]
fn bench_set_key() {
    let mut ctx = CipherContext::bind(Arc::new(AesCipher::portable())).unwrap();
    ctx.set_key(divan::black_box(&[0x42u8; 32])).unwrap();
}

#[divan::bench]
fn bench_registry_get(bencher: divan::Bencher) {
    let registry = CipherRegistry::new();
    registry.get(Algorithm::Aes).unwrap();
    bencher.bench(|| registry.get(divan::black_box(Algorithm::Aes)).unwrap());
}

fn main() {
    divan::main();
}
