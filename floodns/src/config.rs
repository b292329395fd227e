//! Run directory configuration.

use floodns_core::{
    Time,
    properties::{Properties, PropertiesError},
};
use std::{
    fmt::{self, Display},
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "config_floodns.properties";
pub const LOG_DIR_NAME: &str = "logs_floodns";
pub const DEFAULT_KSP_K: usize = 4;

const KEY_TOPOLOGY: &str = "filename_topology";
const KEY_SCHEDULE: &str = "filename_schedule";
const KEY_END_TIME: &str = "simulation_end_time_ns";
const KEY_SEED: &str = "simulation_seed";
const KEY_ROUTING: &str = "routing_strategy";
const KEY_KSP_K: &str = "routing_ksp_k";
const KEY_ALLOCATOR: &str = "allocator";
const KEY_UNIFORM_BANDWIDTH: &str = "allocator_uniform_bandwidth";
const KEY_LP_EPSILON: &str = "allocator_lp_epsilon";
const KEY_LP_DEMAND: &str = "allocator_lp_demand";
const KEY_LP_SOLVER_SCRIPT: &str = "lp_solver_script";
const KEY_LP_SOLVER_INTERPRETER: &str = "lp_solver_interpreter";

const REQUIRED: &[&str] = &[KEY_TOPOLOGY, KEY_SCHEDULE, KEY_END_TIME, KEY_SEED];
const OPTIONAL: &[&str] = &[
    KEY_ROUTING,
    KEY_KSP_K,
    KEY_ALLOCATOR,
    KEY_UNIFORM_BANDWIDTH,
    KEY_LP_EPSILON,
    KEY_LP_DEMAND,
    KEY_LP_SOLVER_SCRIPT,
    KEY_LP_SOLVER_INTERPRETER,
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid run configuration {path}")]
    Properties {
        path: PathBuf,
        #[source]
        source: PropertiesError,
    },
    #[error("the simulation end time must be positive")]
    ZeroEndTime,
    #[error("routing_ksp_k must be at least 1")]
    ZeroK,
    #[error("the uniform_fixed allocator needs allocator_uniform_bandwidth")]
    MissingUniformBandwidth,
    #[error("the epsilon_sum_max_lp allocator needs allocator_lp_epsilon")]
    MissingLpEpsilon,
    #[error("the min_max_link_cap_lp allocator needs allocator_lp_demand")]
    MissingLpDemand,
    #[error("the {0} allocator needs lp_solver_script")]
    MissingLpSolver(AllocatorKind),
    #[error("unknown routing strategy {0:?}, expected ecmp, ksp, valiant or void")]
    UnknownRouting(String),
    #[error(
        "unknown allocator {0:?}, expected simple_mmf, generic_mmf, uniform_fixed, \
         epsilon_sum_max_lp or min_max_link_cap_lp"
    )]
    UnknownAllocator(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoutingKind {
    #[default]
    Ecmp,
    Ksp,
    Valiant,
    Void,
}

impl FromStr for RoutingKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ecmp" => Ok(Self::Ecmp),
            "ksp" => Ok(Self::Ksp),
            "valiant" => Ok(Self::Valiant),
            "void" => Ok(Self::Void),
            other => Err(ConfigError::UnknownRouting(other.to_owned())),
        }
    }
}

impl Display for RoutingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ecmp => "ecmp",
            Self::Ksp => "ksp",
            Self::Valiant => "valiant",
            Self::Void => "void",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocatorKind {
    #[default]
    SimpleMmf,
    GenericMmf,
    UniformFixed,
    EpsilonSumMaxLp,
    MinMaxLinkCapLp,
}

impl AllocatorKind {
    /// Whether the allocator solves a linear program at every instant.
    pub fn needs_lp_solver(self) -> bool {
        matches!(self, Self::EpsilonSumMaxLp | Self::MinMaxLinkCapLp)
    }
}

impl FromStr for AllocatorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple_mmf" => Ok(Self::SimpleMmf),
            "generic_mmf" => Ok(Self::GenericMmf),
            "uniform_fixed" => Ok(Self::UniformFixed),
            "epsilon_sum_max_lp" => Ok(Self::EpsilonSumMaxLp),
            "min_max_link_cap_lp" => Ok(Self::MinMaxLinkCapLp),
            other => Err(ConfigError::UnknownAllocator(other.to_owned())),
        }
    }
}

impl Display for AllocatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SimpleMmf => "simple_mmf",
            Self::GenericMmf => "generic_mmf",
            Self::UniformFixed => "uniform_fixed",
            Self::EpsilonSumMaxLp => "epsilon_sum_max_lp",
            Self::MinMaxLinkCapLp => "min_max_link_cap_lp",
        })
    }
}

/// Everything needed to run the simulation of a run directory.
///
/// File names are resolved against the run directory.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub run_dir: PathBuf,
    pub topology_file: PathBuf,
    pub schedule_file: PathBuf,
    pub end_time: Time,
    pub seed: u64,
    pub routing: RoutingKind,
    pub ksp_k: usize,
    pub allocator: AllocatorKind,
    /// only for [`AllocatorKind::UniformFixed`]
    pub uniform_bandwidth: Option<f64>,
    /// only for [`AllocatorKind::EpsilonSumMaxLp`]
    pub lp_epsilon: Option<f64>,
    /// demand of every connection, only for [`AllocatorKind::MinMaxLinkCapLp`]
    pub lp_demand: Option<f64>,
    pub lp_solver_script: Option<PathBuf>,
    /// `python3` when not given
    pub lp_solver_interpreter: Option<String>,
    pub log_dir: PathBuf,
}

impl RunConfig {
    /// Read [`CONFIG_FILE_NAME`] of `run_dir`.
    pub fn load(run_dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let run_dir = run_dir.as_ref();
        let path = run_dir.join(CONFIG_FILE_NAME);
        let properties = Properties::load(&path).map_err(|source| ConfigError::Properties {
            path: path.clone(),
            source,
        })?;
        let config = Self::from_properties(run_dir, &properties).map_err(|error| match error {
            ConfigError::Properties { source, .. } => ConfigError::Properties { path, source },
            other => other,
        })?;
        tracing::info!(
            run_dir = %run_dir.display(),
            end_time = %config.end_time,
            seed = config.seed,
            routing = %config.routing,
            allocator = %config.allocator,
            "run configuration loaded"
        );
        Ok(config)
    }

    pub fn from_properties(run_dir: &Path, properties: &Properties) -> Result<Self, ConfigError> {
        let invalid = |source: PropertiesError| ConfigError::Properties {
            path: run_dir.join(CONFIG_FILE_NAME),
            source,
        };

        properties.validate(REQUIRED, OPTIONAL).map_err(invalid)?;

        let topology_file = run_dir.join(properties.string(KEY_TOPOLOGY).map_err(invalid)?);
        let schedule_file = run_dir.join(properties.string(KEY_SCHEDULE).map_err(invalid)?);
        let end_time = Time::new(properties.u64(KEY_END_TIME).map_err(invalid)?);
        if end_time == Time::ZERO {
            return Err(ConfigError::ZeroEndTime);
        }
        let seed = properties.u64(KEY_SEED).map_err(invalid)?;

        let routing = match properties.get(KEY_ROUTING) {
            Some(_) => properties.string(KEY_ROUTING).map_err(invalid)?.parse()?,
            None => RoutingKind::default(),
        };
        let ksp_k = properties
            .parse_optional::<usize>(KEY_KSP_K)
            .map_err(invalid)?
            .unwrap_or(DEFAULT_KSP_K);
        if ksp_k == 0 {
            return Err(ConfigError::ZeroK);
        }

        let allocator = match properties.get(KEY_ALLOCATOR) {
            Some(_) => properties.string(KEY_ALLOCATOR).map_err(invalid)?.parse()?,
            None => AllocatorKind::default(),
        };
        let optional_f64 = |key: &str| -> Result<Option<f64>, ConfigError> {
            if properties.contains(key) {
                Ok(Some(properties.non_negative_f64(key).map_err(invalid)?))
            } else {
                Ok(None)
            }
        };
        let uniform_bandwidth = optional_f64(KEY_UNIFORM_BANDWIDTH)?;
        if allocator == AllocatorKind::UniformFixed && uniform_bandwidth.is_none() {
            return Err(ConfigError::MissingUniformBandwidth);
        }

        let lp_epsilon = optional_f64(KEY_LP_EPSILON)?;
        let lp_demand = optional_f64(KEY_LP_DEMAND)?;
        if allocator == AllocatorKind::EpsilonSumMaxLp && lp_epsilon.is_none() {
            return Err(ConfigError::MissingLpEpsilon);
        }
        if allocator == AllocatorKind::MinMaxLinkCapLp && lp_demand.is_none() {
            return Err(ConfigError::MissingLpDemand);
        }
        let lp_solver_script = match properties.get(KEY_LP_SOLVER_SCRIPT) {
            Some(_) => Some(run_dir.join(properties.string(KEY_LP_SOLVER_SCRIPT).map_err(invalid)?)),
            None => None,
        };
        if allocator.needs_lp_solver() && lp_solver_script.is_none() {
            return Err(ConfigError::MissingLpSolver(allocator));
        }
        let lp_solver_interpreter = match properties.get(KEY_LP_SOLVER_INTERPRETER) {
            Some(_) => Some(
                properties
                    .string(KEY_LP_SOLVER_INTERPRETER)
                    .map_err(invalid)?,
            ),
            None => None,
        };

        Ok(Self {
            run_dir: run_dir.to_path_buf(),
            topology_file,
            schedule_file,
            end_time,
            seed,
            routing,
            ksp_k,
            allocator,
            uniform_bandwidth,
            lp_epsilon,
            lp_demand,
            lp_solver_script,
            lp_solver_interpreter,
            log_dir: run_dir.join(LOG_DIR_NAME),
        })
    }
}
