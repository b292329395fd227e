/*!
# floodns

Runs the flow-level simulation described by a run directory:

```text
run_dir/
├── config_floodns.properties
├── <topology file>
├── <schedule file>
└── logs_floodns/          written by the run
```

The kernel, the policies and the input formats live in [`floodns_core`];
this crate adds the CSV result logs, the run configuration and the
external linear program solver.
*/

pub mod config;
pub mod file_sink;
pub mod glop;
pub mod run;

pub use self::{
    config::{AllocatorKind, ConfigError, RoutingKind, RunConfig},
    file_sink::{FileSink, LogFile},
    glop::GlopSolver,
    run::{BasicSimulation, RunError},
};

// convenient re-export of the `floodns_core` objects needed to drive a run
pub use floodns_core::{SimStats, Time};
