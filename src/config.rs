//! Simulation Configuration
//!
//! Fully typed configuration for a run, parsed from `name:value` input
//! files (one pair per line, list values comma-separated, custom dividend
//! schedules keyed by the trader-type index). Everything is validated
//! before any simulation work starts; a bad input never publishes partial
//! state.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};

/// Default cap for the per-agent probability draw of the dividend-matching
/// heuristic, overridable with the `p_max` input key.
pub const DEFAULT_REP_PROBABILITY_CAP: f64 = 0.1;

/// Which representativeness heuristic reacts to market activity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RepVariant {
    /// Per-security: a falling streak caps the aspiration at `epsilon`, a
    /// rising streak lifts it to the dividend.
    One { epsilon: f64, phi: usize },
    /// Cross-security elimination: a falling streak rules the state out and
    /// rescales the agent's other uncertain aspirations.
    /// `rescale_uses_prior_count` selects the pre-removal reading of the
    /// `(C + 1) / C` factor.
    Two {
        epsilon: f64,
        phi: usize,
        rescale_uses_prior_count: bool,
    },
    /// Dividend matching against the latest transaction price, applied
    /// per-agent at a small random probability once `iteration > threshold`.
    Three { threshold: i64, p_max: f64 },
}

/// How orders reach the markets within an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MarketDiscipline {
    /// One randomized (agent, security, bid/ask) action per iteration;
    /// clearing is attempted on every book update.
    Continuous { pick_agent_first: bool },
    /// Every agent quotes every holding, then all markets clear once at the
    /// end of the iteration.
    SemiSync { rho: f64 },
}

/// Dividend payoff assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DividendScheme {
    /// Every holding pays 1.
    Homogeneous,
    /// `counts[t]` agents of type `t`, assigned in agent order; type `t`
    /// pays `payoffs[t][state]` per unit.
    Custom {
        counts: Vec<usize>,
        payoffs: Vec<Vec<f64>>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// N: number of agents (small worlds).
    pub num_agents: usize,
    /// S: number of states in the large world.
    pub num_states: usize,
    /// E: per-period endowment of each held security.
    pub endowment: i64,
    /// K: states per agent (fix-states mode) or agents per state
    /// (fix-worlds mode).
    pub states_per_agent: usize,
    pub num_periods: u64,
    /// i: market-making iterations per period.
    pub iterations: i64,
    /// r: states realized each period.
    pub num_realized: usize,
    /// True: each agent gets K states. False: each state goes to K agents.
    pub fix_num_states: bool,
    /// Post-transaction price anchoring weight.
    pub alpha: f64,
    /// Period-end dividend anchoring weight (backlog updates).
    pub beta: f64,
    /// Clear at the bid-ask midpoint, or at the earlier order's price.
    pub by_midpoint: bool,
    pub use_backlog: bool,
    pub discipline: MarketDiscipline,
    pub rep: RepVariant,
    pub dividends: DividendScheme,
    /// Prefix for the persistence database (`<file_name>.db`).
    pub file_name: String,
    pub seed: u64,
}

impl SimConfig {
    pub fn from_input_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read input file {}", path.display()))?;
        Self::from_input_str(&text)
    }

    pub fn from_input_str(text: &str) -> Result<Self> {
        let pairs = InputPairs::parse(text)?;

        let discipline = match pairs.require_i64("market_type")? {
            1 => MarketDiscipline::Continuous {
                pick_agent_first: pairs.require_bool("pick_agent_first")?,
            },
            2 => MarketDiscipline::SemiSync {
                rho: pairs.require_f64("rho")?,
            },
            other => bail!("market_type must be 1 or 2, got {other}"),
        };

        let rep = match pairs.require_i64("rep_flag")? {
            1 => RepVariant::One {
                epsilon: pairs.require_f64("epsilon")?,
                phi: pairs.require_usize("phi")?,
            },
            2 => RepVariant::Two {
                epsilon: pairs.require_f64("epsilon")?,
                phi: pairs.require_usize("phi")?,
                rescale_uses_prior_count: pairs
                    .optional_bool("rescale_uses_prior_count", false)?,
            },
            3 => RepVariant::Three {
                threshold: pairs.require_i64("rep_threshold")?,
                p_max: pairs.optional_f64("p_max", DEFAULT_REP_PROBABILITY_CAP)?,
            },
            other => bail!("rep_flag must be 1, 2 or 3, got {other}"),
        };

        let num_trader_types = if pairs.optional_bool("is_custom", false)? {
            Some(pairs.require_usize("num_trader_types")?)
        } else {
            None
        };
        let dividends = match num_trader_types {
            Some(num_types) => {
                let counts = pairs.require_usize_list("num_traders_by_type")?;
                ensure!(
                    counts.len() == num_types,
                    "num_traders_by_type has {} entries but num_trader_types is {}",
                    counts.len(),
                    num_types
                );
                let mut payoffs = Vec::with_capacity(num_types);
                for trader_type in 0..num_types {
                    payoffs.push(pairs.require_f64_list(&trader_type.to_string())?);
                }
                DividendScheme::Custom { counts, payoffs }
            }
            None => DividendScheme::Homogeneous,
        };

        let config = SimConfig {
            num_agents: pairs.require_usize("N")?,
            num_states: pairs.require_usize("S")?,
            endowment: pairs.require_i64("E")?,
            states_per_agent: pairs.require_usize("K")?,
            num_periods: pairs.require_u64("num_periods")?,
            iterations: pairs.require_i64("i")?,
            num_realized: pairs.require_usize("r")?,
            fix_num_states: pairs.require_bool("fix_num_states")?,
            alpha: pairs.require_f64("alpha")?,
            beta: pairs.require_f64("beta")?,
            by_midpoint: pairs.require_bool("by_midpoint")?,
            use_backlog: pairs.require_bool("use_backlog")?,
            discipline,
            rep,
            dividends,
            file_name: pairs.require("file_name")?.to_string(),
            seed: pairs.optional_u64("seed", 0)?,
        };

        pairs.reject_unknown(num_trader_types)?;
        config.validate()?;
        Ok(config)
    }

    /// Invariant checks, run before any simulation work.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.num_agents >= 1, "N must be at least 1");
        ensure!(self.num_states >= 1, "S must be at least 1");
        ensure!(self.states_per_agent >= 1, "K must be at least 1");
        ensure!(self.endowment >= 0, "E must be non-negative");
        ensure!(self.iterations >= 0, "i must be non-negative");
        if self.fix_num_states {
            ensure!(
                self.states_per_agent <= self.num_states,
                "each agent draws {} distinct states but the large world only has {}",
                self.states_per_agent,
                self.num_states
            );
        } else {
            ensure!(
                self.states_per_agent <= self.num_agents,
                "each state goes to {} distinct agents but there are only {}",
                self.states_per_agent,
                self.num_agents
            );
        }
        ensure!(
            self.num_realized <= self.num_states,
            "r = {} states cannot realize out of S = {}",
            self.num_realized,
            self.num_states
        );
        ensure!(
            self.alpha > 0.0 && self.alpha < 1.0,
            "alpha must lie in (0, 1)"
        );
        ensure!(self.beta > 0.0 && self.beta < 1.0, "beta must lie in (0, 1)");

        match self.rep {
            RepVariant::One { epsilon, phi } | RepVariant::Two { epsilon, phi, .. } => {
                ensure!(epsilon >= 0.0, "epsilon must be non-negative");
                ensure!(phi >= 1, "phi must be at least 1");
            }
            RepVariant::Three { threshold, p_max } => {
                ensure!(threshold >= 0, "rep_threshold must be non-negative");
                ensure!(
                    (0.0..=1.0).contains(&p_max),
                    "p_max must lie in [0, 1]"
                );
            }
        }
        if let MarketDiscipline::SemiSync { rho } = self.discipline {
            ensure!((0.0..=1.0).contains(&rho), "rho must lie in [0, 1]");
        }

        if let DividendScheme::Custom { counts, payoffs } = &self.dividends {
            let total: usize = counts.iter().sum();
            ensure!(
                total == self.num_agents,
                "num_traders_by_type sums to {} but N is {}",
                total,
                self.num_agents
            );
            for (trader_type, row) in payoffs.iter().enumerate() {
                ensure!(
                    row.len() == self.num_states,
                    "trader type {} lists {} dividends but S is {}",
                    trader_type,
                    row.len(),
                    self.num_states
                );
                ensure!(
                    row.iter().all(|d| *d >= 0.0),
                    "trader type {} has a negative dividend",
                    trader_type
                );
            }
        }
        Ok(())
    }
}

/// Raw `name:value` pairs from an input file.
struct InputPairs {
    map: HashMap<String, String>,
}

impl InputPairs {
    fn parse(text: &str) -> Result<Self> {
        let mut map = HashMap::new();
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (name, value) = line
                .split_once(':')
                .with_context(|| format!("line {}: expected name:value", lineno + 1))?;
            map.insert(name.trim().to_string(), value.trim().to_string());
        }
        Ok(Self { map })
    }

    fn require(&self, key: &str) -> Result<&str> {
        self.map
            .get(key)
            .map(String::as_str)
            .with_context(|| format!("missing required input `{key}`"))
    }

    fn require_i64(&self, key: &str) -> Result<i64> {
        self.require(key)?
            .parse()
            .with_context(|| format!("input `{key}` is not an integer"))
    }

    fn require_u64(&self, key: &str) -> Result<u64> {
        self.require(key)?
            .parse()
            .with_context(|| format!("input `{key}` is not a non-negative integer"))
    }

    fn require_usize(&self, key: &str) -> Result<usize> {
        self.require(key)?
            .parse()
            .with_context(|| format!("input `{key}` is not a non-negative integer"))
    }

    fn require_f64(&self, key: &str) -> Result<f64> {
        self.require(key)?
            .parse()
            .with_context(|| format!("input `{key}` is not a number"))
    }

    fn require_bool(&self, key: &str) -> Result<bool> {
        Self::parse_bool(self.require(key)?).with_context(|| format!("input `{key}`"))
    }

    fn optional_bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.map.get(key) {
            Some(value) => Self::parse_bool(value).with_context(|| format!("input `{key}`")),
            None => Ok(default),
        }
    }

    fn optional_f64(&self, key: &str, default: f64) -> Result<f64> {
        match self.map.get(key) {
            Some(value) => value
                .parse()
                .with_context(|| format!("input `{key}` is not a number")),
            None => Ok(default),
        }
    }

    fn optional_u64(&self, key: &str, default: u64) -> Result<u64> {
        match self.map.get(key) {
            Some(value) => value
                .parse()
                .with_context(|| format!("input `{key}` is not a non-negative integer")),
            None => Ok(default),
        }
    }

    fn require_usize_list(&self, key: &str) -> Result<Vec<usize>> {
        self.require(key)?
            .split(',')
            .map(|item| {
                item.trim()
                    .parse()
                    .with_context(|| format!("input `{key}` has a non-integer entry"))
            })
            .collect()
    }

    fn require_f64_list(&self, key: &str) -> Result<Vec<f64>> {
        self.require(key)?
            .split(',')
            .map(|item| {
                item.trim()
                    .parse()
                    .with_context(|| format!("input `{key}` has a non-numeric entry"))
            })
            .collect()
    }

    fn parse_bool(value: &str) -> Result<bool> {
        match value {
            "True" | "true" | "1" => Ok(true),
            "False" | "false" | "0" => Ok(false),
            other => bail!("expected a boolean, got `{other}`"),
        }
    }

    /// Typos in input files should fail loudly, not silently configure
    /// nothing.
    fn reject_unknown(&self, num_trader_types: Option<usize>) -> Result<()> {
        const KNOWN: &[&str] = &[
            "N",
            "S",
            "E",
            "K",
            "num_periods",
            "i",
            "r",
            "market_type",
            "rep_flag",
            "rep_threshold",
            "phi",
            "epsilon",
            "p_max",
            "rescale_uses_prior_count",
            "alpha",
            "beta",
            "rho",
            "fix_num_states",
            "by_midpoint",
            "pick_agent_first",
            "use_backlog",
            "is_custom",
            "num_trader_types",
            "num_traders_by_type",
            "file_name",
            "seed",
        ];
        for key in self.map.keys() {
            let is_type_row = num_trader_types.is_some_and(|n| {
                key.parse::<usize>().is_ok_and(|t| t < n)
            });
            ensure!(
                KNOWN.contains(&key.as_str()) || is_type_row,
                "unknown input `{key}`"
            );
        }
        Ok(())
    }
}
