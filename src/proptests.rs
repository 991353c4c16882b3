use crate::{
    intersect, is_normalized, subtract, union, BufferExtent, Extent, SparseMemStream, SparseStream,
    StreamBuilder,
};
use proptest::prelude::*;
use proptest::test_runner::TestCaseResult;

const MAX_ADDR: u64 = 4096;
const MAX_EXTENT_LEN: u64 = 512;

fn extent_strategy() -> impl Strategy<Value = Extent> {
    (0..MAX_ADDR, 0..=MAX_EXTENT_LEN).prop_map(|(start, length)| Extent::new(start, length))
}

fn normalized_set_strategy() -> impl Strategy<Value = Vec<Extent>> {
    prop::collection::vec(extent_strategy(), 0..12).prop_map(|raw| {
        raw.into_iter()
            .fold(Vec::new(), |acc, e| union(&acc, &[e]))
    })
}

#[derive(Debug, Clone)]
struct Registered {
    start: u64,
    data: Vec<u8>,
}

fn builder_scenario_strategy() -> impl Strategy<Value = (u64, Vec<Registered>)> {
    (64u64..=2048).prop_flat_map(|output_len| {
        let reg = (0..output_len, 1usize..=128, any::<u8>()).prop_map(
            move |(start, want_len, seed)| {
                let max_len = (output_len - start).min(want_len as u64) as usize;
                let data = (0..max_len)
                    .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
                    .collect();
                Registered { start, data }
            },
        );
        (Just(output_len), prop::collection::vec(reg, 0..10))
    })
}

#[derive(Debug, Clone)]
enum Op {
    Write { offset: u32, data: Vec<u8> },
    Read { offset: u32, len: usize },
    Flush,
}

fn ops_strategy(stream_len: u32) -> BoxedStrategy<Vec<Op>> {
    let op = prop_oneof![
        5 => (0..stream_len, prop::collection::vec(any::<u8>(), 0..512)).prop_map(
            move |(offset, mut data)| {
                let max = (stream_len - offset) as usize;
                data.truncate(max);
                Op::Write { offset, data }
            }
        ),
        4 => (0..=stream_len, 0usize..512).prop_map(|(offset, len)| Op::Read { offset, len }),
        1 => Just(Op::Flush),
    ];
    prop::collection::vec(op, 1..48).boxed()
}

fn sparse_scenario_strategy() -> BoxedStrategy<(u32, usize, Vec<Op>)> {
    (
        512u32..=8192,
        prop_oneof![Just(1usize), Just(16), Just(512), Just(4096)],
    )
        .prop_flat_map(|(stream_len, block_size)| {
            (Just(stream_len), Just(block_size), ops_strategy(stream_len))
        })
        .boxed()
}

fn check_normalized(set: &[Extent]) -> TestCaseResult {
    prop_assert!(is_normalized(set), "set not normalized: {set:?}");
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    /// Splitting a set by a range and re-joining the pieces is the identity.
    #[test]
    fn prop_split_round_trips_through_union(
        set in normalized_set_strategy(),
        range in extent_strategy(),
    ) {
        check_normalized(&set)?;

        let inside = intersect(&set, range);
        let outside = subtract(&set, range);
        check_normalized(&outside)?;

        let rejoined = union(&inside, &outside);
        prop_assert_eq!(rejoined, set);
    }

    /// Union output is always normalized and covers exactly the input bytes.
    #[test]
    fn prop_union_is_normalized(
        a in normalized_set_strategy(),
        b in normalized_set_strategy(),
    ) {
        let merged = union(&a, &b);
        check_normalized(&merged)?;

        let total: u64 = merged.iter().map(|e| e.length).sum();
        let naive: u64 = {
            // Count distinct covered offsets against a flat bitmap model.
            let mut covered = vec![false; (MAX_ADDR + MAX_EXTENT_LEN) as usize];
            for e in a.iter().chain(b.iter()) {
                for o in e.start..e.end() {
                    covered[o as usize] = true;
                }
            }
            covered.iter().filter(|c| **c).count() as u64
        };
        prop_assert_eq!(total, naive);
    }

    /// Composed output matches a flat reference buffer written in registration
    /// order (later registration wins byte-for-byte).
    #[test]
    fn prop_builder_matches_reference((output_len, registered) in builder_scenario_strategy()) {
        let mut model = vec![0u8; output_len as usize];
        let mut builder = StreamBuilder::new();
        let mut declared: Vec<Extent> = Vec::new();

        for r in &registered {
            if r.data.is_empty() {
                continue;
            }
            let start = r.start as usize;
            model[start..start + r.data.len()].copy_from_slice(&r.data);
            declared = union(&declared, &[Extent::new(r.start, r.data.len() as u64)]);
            builder.add(BufferExtent::new(r.start, r.data.clone()));
        }

        let mut stream = builder.build(output_len).unwrap();
        prop_assert_eq!(stream.len(), output_len);

        let stream_extents = stream.extents();
        check_normalized(&stream_extents)?;
        prop_assert_eq!(stream_extents, declared);

        let mut all = vec![0xA5u8; output_len as usize];
        prop_assert_eq!(stream.read_at(0, &mut all).unwrap(), output_len as usize);
        prop_assert_eq!(all.as_slice(), model.as_slice());

        // Partial reads agree with the model too, including across release of
        // the builder's read state.
        stream.release_read_state();
        let mid = output_len / 2;
        let mut tail = vec![0xA5u8; (output_len - mid) as usize];
        prop_assert_eq!(stream.read_at(mid, &mut tail).unwrap(), tail.len());
        prop_assert_eq!(tail.as_slice(), &model[mid as usize..]);
    }

    /// Sparse memory stream behaves like a flat byte array with implicit
    /// zeroes, and never reports gaps as extents.
    #[test]
    fn prop_sparse_mem_matches_reference(
        (stream_len, block_size, ops) in sparse_scenario_strategy(),
    ) {
        let mut stream = SparseMemStream::with_block_size(block_size);
        stream.set_len(stream_len as u64).unwrap();
        let mut model = vec![0u8; stream_len as usize];

        for op in &ops {
            match op {
                Op::Write { offset, data } => {
                    if data.is_empty() {
                        continue;
                    }
                    let offset = *offset as usize;
                    stream.write_at(offset as u64, data).unwrap();
                    model[offset..offset + data.len()].copy_from_slice(data);
                }
                Op::Read { offset, len } => {
                    let offset = *offset as usize;
                    let mut buf = vec![0xA5u8; *len];
                    let n = stream.read_at(offset as u64, &mut buf).unwrap();
                    let expected = (*len).min(stream_len as usize - offset);
                    prop_assert_eq!(n, expected);
                    prop_assert_eq!(&buf[..n], &model[offset..offset + n]);
                }
                Op::Flush => stream.flush().unwrap(),
            }
        }

        let set = stream.extents();
        check_normalized(&set)?;

        // Every byte outside the reported extents must be zero.
        let mut outside = vec![Extent::new(0, stream_len as u64)];
        for e in &set {
            outside = subtract(&outside, *e);
        }
        for gap in outside {
            for o in gap.start..gap.end() {
                prop_assert_eq!(model[o as usize], 0, "gap byte {} non-zero", o);
            }
        }

        let mut all = vec![0u8; stream_len as usize];
        prop_assert_eq!(stream.read_at(0, &mut all).unwrap(), stream_len as usize);
        prop_assert_eq!(all.as_slice(), model.as_slice());
    }
}
