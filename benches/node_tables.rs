// Node table benchmarks
//
// Measures the hot per-frame paths: leaf emplace with dedup, instanced
// aggregation, and clear-then-refill reuse.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};

use ash::vk;
use ash::vk::Handle;
use ember_engine::error::CapacityPolicy;
use ember_engine::renderer::commands::{DrawIndexedIndirectCommand, NodeCommand};
use ember_engine::renderer::pipeline::{CullSide, PipelineAndId};
use ember_engine::renderer::render_queue::{
    CountedNode, InstancedPipelinesNodes, PipelinesNodes, RenderNodeId,
};
use ember_engine::scene::{CulledId, PassId, SubmeshId};

const NODE_COUNTS: &[u32] = &[256, 1024, 4096];

fn counted(id: u32) -> CountedNode {
    CountedNode {
        node: RenderNodeId(id),
        culled: CulledId(id),
        command: NodeCommand::Indexed(DrawIndexedIndirectCommand {
            index_count: 36,
            instance_count: 1,
            first_index: 0,
            vertex_offset: 0,
            first_instance: 0,
        }),
        instance_count: 1,
        visible: true,
    }
}

fn pipeline(id: u16) -> PipelineAndId {
    PipelineAndId {
        id,
        flags_hash: u64::from(id) * 1_000_003,
    }
}

fn bench_plain_emplace(c: &mut Criterion) {
    let mut group = c.benchmark_group("plain_emplace");

    for &count in NODE_COUNTS {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let mut table = PipelinesNodes::new(CapacityPolicy::Error);
            b.iter(|| {
                table.clear();
                for i in 0..count {
                    let buffer = vk::Buffer::from_raw(u64::from(i % 8) + 1);
                    table
                        .emplace(
                            pipeline((i % 16) as u16),
                            buffer,
                            counted(i),
                            CullSide::Back,
                        )
                        .unwrap();
                }
                black_box(table.size())
            });
        });
    }

    group.finish();
}

fn bench_plain_dedup_reaffirm(c: &mut Criterion) {
    // Every emplace after the first is a visibility re-affirmation.
    c.bench_function("plain_dedup_reaffirm", |b| {
        let mut table = PipelinesNodes::new(CapacityPolicy::Error);
        let buffer = vk::Buffer::from_raw(1);
        table
            .emplace(pipeline(0), buffer, counted(0), CullSide::Back)
            .unwrap();

        b.iter(|| {
            for _ in 0..1024 {
                table
                    .emplace(pipeline(0), buffer, counted(0), CullSide::Back)
                    .unwrap();
            }
            black_box(table.size())
        });
    });
}

fn bench_instanced_aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("instanced_aggregation");

    for &count in NODE_COUNTS {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let mut rng = StdRng::seed_from_u64(0x5EED);
            let keys: Vec<(u16, u64, u32, u32)> = (0..count)
                .map(|_| {
                    (
                        rng.gen_range(0..8u16),
                        rng.gen_range(1..4u64),
                        rng.gen_range(0..4u32),
                        rng.gen_range(0..32u32),
                    )
                })
                .collect();

            let mut table = InstancedPipelinesNodes::new(CapacityPolicy::Error);
            b.iter(|| {
                table.clear();
                for (i, &(pipe, buf, pass, object)) in keys.iter().enumerate() {
                    table
                        .emplace(
                            pipeline(pipe),
                            vk::Buffer::from_raw(buf),
                            PassId(pass),
                            SubmeshId(object),
                            counted(i as u32),
                            CullSide::Back,
                        )
                        .unwrap();
                }
                black_box(table.size())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_plain_emplace,
    bench_plain_dedup_reaffirm,
    bench_instanced_aggregation
);
criterion_main!(benches);
