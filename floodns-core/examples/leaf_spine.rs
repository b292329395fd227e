use floodns_core::{
    Simulator, Time,
    allocator::SimpleMmfAllocator,
    log::{MemorySink, SharedSink},
    properties::Properties,
    routing::EcmpRouting,
    schedule::Schedule,
    topology::Topology,
};
use rand_chacha::ChaChaRng;
use rand_core::SeedableRng as _;

/// Two ToRs (0, 1) under two spines (2, 3), two servers under each ToR.
const TOPOLOGY: &str = "
num_nodes=8
num_undirected_edges=8
switches=set(0,1,2,3)
switches_which_are_tors=set(0,1)
servers=set(4,5,6,7)
undirected_edges=set(0-2,0-3,1-2,1-3,0-4,0-5,1-6,1-7)
link_data_rate_bit_per_ns=10
";

/// Servers 4 and 5 both send to 6, then 7 sends to 4 a bit later.
const SCHEDULE: &str = "\
0,4,6,100000,0,,first
1,5,6,100000,0,,second
2,7,4,50000,20000,,third
";

fn main() -> anyhow::Result<()> {
    let properties: Properties = TOPOLOGY.parse()?;
    let topology = Topology::from_properties(&properties)?;
    let end = Time::new(1_000_000);
    let schedule = Schedule::parse(SCHEDULE, topology.details(), end)?;

    let sink = SharedSink::new(MemorySink::new());
    let routing = EcmpRouting::new(&topology, ChaChaRng::seed_from_u64(42));
    let mut simulator = Simulator::builder()
        .set_log_sink(sink.clone())
        .build(topology.into_parts().0, SimpleMmfAllocator::new(), routing)?;

    schedule.apply(simulator.context_mut())?;
    simulator.run(end)?;

    for info in &sink.borrow().connection_info {
        println!(
            "{label:>6}: {src}->{dst} {size} bits in {duration} ns ({bw:.3} bit/ns){done}",
            label = info.label.as_deref().unwrap_or("-"),
            src = info.src,
            dst = info.dst,
            size = info.total_size,
            duration = info.duration,
            bw = info.average_bandwidth,
            done = if info.finished { "" } else { ", unfinished" },
        );
    }

    Ok(())
}
