use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tarmac_tree::{insert, ArenaWriter, NoAnnotation, Payload, NIL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IntPayload(i64);

impl Payload for IntPayload {
    const ENCODED_LEN: usize = 8;
    fn encode(&self, buf: &mut [u8]) {
        buf.copy_from_slice(&self.0.to_le_bytes());
    }
    fn decode(buf: &[u8]) -> Self {
        IntPayload(i64::from_le_bytes(buf.try_into().unwrap()))
    }
}

impl tarmac_tree::KeyCmp<IntPayload> for IntPayload {
    fn key_cmp(&self, other: &IntPayload) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

fn insert_10k(c: &mut Criterion) {
    c.bench_function("avl insert 10k sequential", |b| {
        b.iter(|| {
            let path = tempfile::NamedTempFile::new().unwrap().into_temp_path().to_path_buf();
            let mut writer = ArenaWriter::create(path, false, false).unwrap();
            let mut root = NIL;
            for v in 0..10_000i64 {
                root = insert::<IntPayload, NoAnnotation, _>(&mut writer, root, black_box(IntPayload(v)))
                    .unwrap();
            }
            black_box(root);
        })
    });
}

criterion_group!(benches, insert_10k);
criterion_main!(benches);
