//! Counter kinds, snapshot arithmetic, and derived hardware metrics.
//!
//! A [`CounterSnapshot`] is an immutable reading of every tracked counter at
//! one instant on one thread. Each field carries an availability flag:
//! kernel events that could not be opened, read, or that were fully
//! multiplexed away are flagged rather than reported as zeroes-that-look-real.
//! Subtraction and accumulation propagate the flags, so a missing reading can
//! never silently corrupt an aggregate.

/// A measurable quantity tracked per thread.
///
/// The canonical names follow the record data dictionary (`sw.*` for kernel
/// software events, `hw.*` for hardware events, `sw.duration` for wall
/// clock) and are used verbatim in record keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CounterKind {
    /// Real (wall clock) duration, from the monotonic clock.
    WallDuration,
    /// High-resolution per-CPU timer, in nanoseconds.
    CpuClock,
    /// Clock specific to the running task, in nanoseconds.
    TaskClock,
    PageFaults,
    ContextSwitches,
    /// Times the task migrated to a new CPU.
    CpuMigrations,
    MinorFaults,
    /// Major page faults. These required disk I/O to handle.
    MajorFaults,
    /// Alignment faults. Zero on x86.
    AlignmentFaults,
    EmulationFaults,
    CpuCycles,
    /// Retired instructions.
    Instructions,
    /// Stalled cycles during issue.
    StallFrontend,
    /// Stalled cycles during retirement.
    StallBackend,
    /// Cache accesses, usually last level cache.
    CacheReferences,
    CacheMisses,
    /// Retired branch instructions.
    BranchInstructions,
    /// Mispredicted branch instructions.
    BranchMisses,
}

/// Source category of a counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CounterCategory {
    Wall,
    TaskCpu,
    Faults,
    Hardware,
    Derived,
}

/// Unit of a counter or derived metric.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CounterUnit {
    Nanoseconds,
    Count,
    Ratio,
}

impl CounterKind {
    pub const COUNT: usize = 18;

    pub const ALL: [CounterKind; Self::COUNT] = [
        CounterKind::WallDuration,
        CounterKind::CpuClock,
        CounterKind::TaskClock,
        CounterKind::PageFaults,
        CounterKind::ContextSwitches,
        CounterKind::CpuMigrations,
        CounterKind::MinorFaults,
        CounterKind::MajorFaults,
        CounterKind::AlignmentFaults,
        CounterKind::EmulationFaults,
        CounterKind::CpuCycles,
        CounterKind::Instructions,
        CounterKind::StallFrontend,
        CounterKind::StallBackend,
        CounterKind::CacheReferences,
        CounterKind::CacheMisses,
        CounterKind::BranchInstructions,
        CounterKind::BranchMisses,
    ];

    /// Canonical name used in record keys.
    pub const fn name(self) -> &'static str {
        match self {
            CounterKind::WallDuration => "sw.duration",
            CounterKind::CpuClock => "sw.cpu_clock",
            CounterKind::TaskClock => "sw.task_clock",
            CounterKind::PageFaults => "sw.page_faults",
            CounterKind::ContextSwitches => "sw.context_switches",
            CounterKind::CpuMigrations => "sw.cpu_migrations",
            CounterKind::MinorFaults => "sw.page_faults_min",
            CounterKind::MajorFaults => "sw.page_faults_maj",
            CounterKind::AlignmentFaults => "sw.alignment_faults",
            CounterKind::EmulationFaults => "sw.emulation_faults",
            CounterKind::CpuCycles => "hw.cpu_cycles",
            CounterKind::Instructions => "hw.instructions",
            CounterKind::StallFrontend => "hw.stall_cycles_front",
            CounterKind::StallBackend => "hw.stall_cycles_back",
            CounterKind::CacheReferences => "hw.cache_references",
            CounterKind::CacheMisses => "hw.cache_misses",
            CounterKind::BranchInstructions => "hw.branch_instructions",
            CounterKind::BranchMisses => "hw.branch_misses",
        }
    }

    pub const fn category(self) -> CounterCategory {
        match self {
            CounterKind::WallDuration => CounterCategory::Wall,
            CounterKind::CpuClock | CounterKind::TaskClock => CounterCategory::TaskCpu,
            CounterKind::PageFaults
            | CounterKind::ContextSwitches
            | CounterKind::CpuMigrations
            | CounterKind::MinorFaults
            | CounterKind::MajorFaults
            | CounterKind::AlignmentFaults
            | CounterKind::EmulationFaults => CounterCategory::Faults,
            _ => CounterCategory::Hardware,
        }
    }

    pub const fn unit(self) -> CounterUnit {
        match self {
            CounterKind::WallDuration | CounterKind::CpuClock | CounterKind::TaskClock => {
                CounterUnit::Nanoseconds
            }
            _ => CounterUnit::Count,
        }
    }

    /// True when kernel multiplexing can make a raw sample represent only a
    /// fraction of the enabled time, requiring scaling on read.
    pub const fn is_scalable(self) -> bool {
        matches!(self.category(), CounterCategory::Hardware)
    }

    /// Kernel scheduling group for hardware events; software events and the
    /// wall clock are not grouped.
    pub const fn hardware_group(self) -> Option<HardwareGroup> {
        match self {
            CounterKind::CpuCycles
            | CounterKind::Instructions
            | CounterKind::StallFrontend
            | CounterKind::StallBackend => Some(HardwareGroup::Cycles),
            CounterKind::CacheReferences | CounterKind::CacheMisses => Some(HardwareGroup::Cache),
            CounterKind::BranchInstructions | CounterKind::BranchMisses => {
                Some(HardwareGroup::Branch)
            }
            _ => None,
        }
    }

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Hardware events are opened in kernel scheduling groups so that members
/// share `time_enabled`/`time_running` and are multiplexed together.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HardwareGroup {
    /// cpu_cycles (leader), instructions, stall_frontend, stall_backend.
    Cycles,
    /// cache_references (leader), cache_misses.
    Cache,
    /// branch_instructions (leader), branch_misses.
    Branch,
}

impl HardwareGroup {
    pub const COUNT: usize = 3;

    pub const ALL: [HardwareGroup; Self::COUNT] =
        [HardwareGroup::Cycles, HardwareGroup::Cache, HardwareGroup::Branch];

    pub const fn members(self) -> &'static [CounterKind] {
        match self {
            HardwareGroup::Cycles => &[
                CounterKind::CpuCycles,
                CounterKind::Instructions,
                CounterKind::StallFrontend,
                CounterKind::StallBackend,
            ],
            HardwareGroup::Cache => &[CounterKind::CacheReferences, CounterKind::CacheMisses],
            HardwareGroup::Branch => {
                &[CounterKind::BranchInstructions, CounterKind::BranchMisses]
            }
        }
    }

    pub const fn leader(self) -> CounterKind {
        self.members()[0]
    }

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// The `time_enabled`/`time_running` pair reported by the kernel for a
/// scheduling group, in nanoseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimingPair {
    pub enabled_ns: u64,
    pub running_ns: u64,
}

/// Immutable reading of every tracked counter at one instant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CounterSnapshot {
    values: [u64; CounterKind::COUNT],
    available: [bool; CounterKind::COUNT],
    group_times: [TimingPair; HardwareGroup::COUNT],
}

impl Default for CounterSnapshot {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl CounterSnapshot {
    /// All-zero snapshot with every field available. This is the identity for
    /// [`accumulate`](Self::accumulate).
    pub const fn zeroed() -> Self {
        Self {
            values: [0; CounterKind::COUNT],
            available: [true; CounterKind::COUNT],
            group_times: [TimingPair { enabled_ns: 0, running_ns: 0 }; HardwareGroup::COUNT],
        }
    }

    /// All-zero snapshot with every field flagged unavailable, as produced by
    /// the no-op counter provider.
    pub const fn unavailable() -> Self {
        Self {
            values: [0; CounterKind::COUNT],
            available: [false; CounterKind::COUNT],
            group_times: [TimingPair { enabled_ns: 0, running_ns: 0 }; HardwareGroup::COUNT],
        }
    }

    /// Raw field value; zero when the field is unavailable.
    #[inline]
    pub fn value(&self, kind: CounterKind) -> u64 {
        self.values[kind.index()]
    }

    /// Field value, or `None` when unavailable.
    pub fn get(&self, kind: CounterKind) -> Option<u64> {
        if self.available[kind.index()] {
            Some(self.values[kind.index()])
        } else {
            None
        }
    }

    pub fn set(&mut self, kind: CounterKind, value: u64) {
        self.values[kind.index()] = value;
        self.available[kind.index()] = true;
    }

    pub fn set_unavailable(&mut self, kind: CounterKind) {
        self.values[kind.index()] = 0;
        self.available[kind.index()] = false;
    }

    #[inline]
    pub fn is_available(&self, kind: CounterKind) -> bool {
        self.available[kind.index()]
    }

    pub fn any_unavailable(&self) -> bool {
        self.available.iter().any(|a| !a)
    }

    pub fn unavailable_kinds(&self) -> impl Iterator<Item = CounterKind> + '_ {
        CounterKind::ALL
            .into_iter()
            .filter(move |kind| !self.available[kind.index()])
    }

    pub fn set_group_time(&mut self, group: HardwareGroup, pair: TimingPair) {
        self.group_times[group.index()] = pair;
    }

    pub fn group_time(&self, group: HardwareGroup) -> TimingPair {
        self.group_times[group.index()]
    }

    /// Componentwise difference `self − earlier`.
    ///
    /// A field is available on the delta only when it is available on both
    /// sides. A field that would underflow (the earlier reading is larger) is
    /// flagged unavailable and reported in the returned skew set instead of
    /// wrapping. The group timing pairs are re-derived as the difference of
    /// the endpoints so downstream scaling ratios stay meaningful.
    pub fn delta_since(&self, earlier: &CounterSnapshot) -> SnapshotDelta {
        let mut delta = CounterSnapshot::zeroed();
        let mut skewed = SkewSet::empty();
        for kind in CounterKind::ALL {
            let i = kind.index();
            if !self.available[i] || !earlier.available[i] {
                delta.set_unavailable(kind);
            } else if self.values[i] < earlier.values[i] {
                delta.set_unavailable(kind);
                skewed.insert(kind);
            } else {
                delta.set(kind, self.values[i] - earlier.values[i]);
            }
        }
        for group in HardwareGroup::ALL {
            let a = earlier.group_time(group);
            let b = self.group_time(group);
            delta.set_group_time(
                group,
                TimingPair {
                    enabled_ns: b.enabled_ns.saturating_sub(a.enabled_ns),
                    running_ns: b.running_ns.saturating_sub(a.running_ns),
                },
            );
        }
        SnapshotDelta { snapshot: delta, skewed }
    }

    /// Componentwise saturating addition, used by aggregates. Availability is
    /// the conjunction: once a field has been missing in any contribution,
    /// the accumulated field stays flagged.
    pub fn accumulate(&mut self, other: &CounterSnapshot) {
        for kind in CounterKind::ALL {
            let i = kind.index();
            if !self.available[i] || !other.available[i] {
                self.set_unavailable(kind);
            } else {
                self.values[i] = self.values[i].saturating_add(other.values[i]);
            }
        }
        for group in HardwareGroup::ALL {
            let a = self.group_time(group);
            let b = other.group_time(group);
            self.set_group_time(
                group,
                TimingPair {
                    enabled_ns: a.enabled_ns.saturating_add(b.enabled_ns),
                    running_ns: a.running_ns.saturating_add(b.running_ns),
                },
            );
        }
    }
}

/// Result of snapshot subtraction: the delta plus the set of fields that
/// would have underflowed.
#[derive(Clone, Copy, Debug)]
pub struct SnapshotDelta {
    pub snapshot: CounterSnapshot,
    pub skewed: SkewSet,
}

/// Small set of counter kinds, used to report snapshot skew.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SkewSet(u32);

impl SkewSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, kind: CounterKind) {
        self.0 |= 1 << kind.index();
    }

    pub fn contains(&self, kind: CounterKind) -> bool {
        self.0 & (1 << kind.index()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = CounterKind> + '_ {
        CounterKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}

/// Named derived metric, computed from a snapshot delta.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DerivedMetric {
    CpuSeconds,
    TaskIdleFraction,
    MajorFaultsPerSecond,
    CyclesPerInstruction,
    FrontendStallFraction,
    BackendStallFraction,
    CacheMissFraction,
    BranchMissFraction,
}

impl DerivedMetric {
    pub const COUNT: usize = 8;

    pub const ALL: [DerivedMetric; Self::COUNT] = [
        DerivedMetric::CpuSeconds,
        DerivedMetric::TaskIdleFraction,
        DerivedMetric::MajorFaultsPerSecond,
        DerivedMetric::CyclesPerInstruction,
        DerivedMetric::FrontendStallFraction,
        DerivedMetric::BackendStallFraction,
        DerivedMetric::CacheMissFraction,
        DerivedMetric::BranchMissFraction,
    ];

    /// Canonical name used in record keys.
    pub const fn name(self) -> &'static str {
        match self {
            DerivedMetric::CpuSeconds => "cpu_seconds",
            DerivedMetric::TaskIdleFraction => "task_idle_pct",
            DerivedMetric::MajorFaultsPerSecond => "page_fault_major_per_sec",
            DerivedMetric::CyclesPerInstruction => "cycles_per_instr",
            DerivedMetric::FrontendStallFraction => "issue_stall_pct",
            DerivedMetric::BackendStallFraction => "retire_stall_pct",
            DerivedMetric::CacheMissFraction => "cache_miss_pct",
            DerivedMetric::BranchMissFraction => "branch_miss_pct",
        }
    }

    pub const fn unit(self) -> CounterUnit {
        match self {
            DerivedMetric::CpuSeconds | DerivedMetric::MajorFaultsPerSecond => CounterUnit::Count,
            _ => CounterUnit::Ratio,
        }
    }

    pub const fn category(self) -> CounterCategory {
        CounterCategory::Derived
    }
}

/// Metrics computed from a snapshot delta.
///
/// Fractions are clamped to [0, 1]. Divisions by zero yield 0, except
/// cycles-per-instruction which yields NaN (0 instructions retired means the
/// ratio is meaningless, not perfect).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DerivedMetrics {
    pub cpu_seconds: f64,
    pub task_idle_fraction: f64,
    pub major_faults_per_second: f64,
    pub cycles_per_instruction: f64,
    pub frontend_stall_fraction: f64,
    pub backend_stall_fraction: f64,
    pub cache_miss_fraction: f64,
    pub branch_miss_fraction: f64,
}

impl DerivedMetrics {
    pub fn from_snapshot(snapshot: &CounterSnapshot) -> Self {
        let cpu_clock = snapshot.value(CounterKind::CpuClock) as f64;
        let task_clock = snapshot.value(CounterKind::TaskClock) as f64;
        let cycles = snapshot.value(CounterKind::CpuCycles) as f64;
        let instructions = snapshot.value(CounterKind::Instructions) as f64;
        let cache_references = snapshot.value(CounterKind::CacheReferences) as f64;
        let branch_instructions = snapshot.value(CounterKind::BranchInstructions) as f64;

        let cpu_seconds = cpu_clock / 1_000_000_000.0;

        let task_idle_fraction = if cpu_clock == 0.0 {
            0.0
        } else {
            (1.0 - task_clock / cpu_clock).clamp(0.0, 1.0)
        };

        let major_faults_per_second = if cpu_seconds == 0.0 {
            0.0
        } else {
            snapshot.value(CounterKind::MajorFaults) as f64 / cpu_seconds
        };

        let cycles_per_instruction = if instructions == 0.0 {
            f64::NAN
        } else {
            cycles / instructions
        };

        let frontend_stall_fraction = if cycles == 0.0 {
            0.0
        } else {
            (snapshot.value(CounterKind::StallFrontend) as f64 / cycles).clamp(0.0, 1.0)
        };

        let backend_stall_fraction = if cycles == 0.0 {
            0.0
        } else {
            (snapshot.value(CounterKind::StallBackend) as f64 / cycles).clamp(0.0, 1.0)
        };

        let cache_miss_fraction = if cache_references == 0.0 {
            0.0
        } else {
            (snapshot.value(CounterKind::CacheMisses) as f64 / cache_references).clamp(0.0, 1.0)
        };

        let branch_miss_fraction = if branch_instructions == 0.0 {
            0.0
        } else {
            (snapshot.value(CounterKind::BranchMisses) as f64 / branch_instructions)
                .clamp(0.0, 1.0)
        };

        Self {
            cpu_seconds,
            task_idle_fraction,
            major_faults_per_second,
            cycles_per_instruction,
            frontend_stall_fraction,
            backend_stall_fraction,
            cache_miss_fraction,
            branch_miss_fraction,
        }
    }

    pub fn get(&self, metric: DerivedMetric) -> f64 {
        match metric {
            DerivedMetric::CpuSeconds => self.cpu_seconds,
            DerivedMetric::TaskIdleFraction => self.task_idle_fraction,
            DerivedMetric::MajorFaultsPerSecond => self.major_faults_per_second,
            DerivedMetric::CyclesPerInstruction => self.cycles_per_instruction,
            DerivedMetric::FrontendStallFraction => self.frontend_stall_fraction,
            DerivedMetric::BackendStallFraction => self.backend_stall_fraction,
            DerivedMetric::CacheMissFraction => self.cache_miss_fraction,
            DerivedMetric::BranchMissFraction => self.branch_miss_fraction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(kinds: &[(CounterKind, u64)]) -> CounterSnapshot {
        let mut snapshot = CounterSnapshot::zeroed();
        for &(kind, value) in kinds {
            snapshot.set(kind, value);
        }
        snapshot
    }

    #[test]
    fn kind_tables_are_consistent() {
        assert_eq!(CounterKind::ALL.len(), CounterKind::COUNT);
        for (i, kind) in CounterKind::ALL.into_iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
        // Every hardware kind belongs to exactly one group and the group
        // member lists cover all of them.
        let grouped: usize = HardwareGroup::ALL.iter().map(|g| g.members().len()).sum();
        let hardware = CounterKind::ALL
            .iter()
            .filter(|k| k.category() == CounterCategory::Hardware)
            .count();
        assert_eq!(grouped, hardware);
        for group in HardwareGroup::ALL {
            for member in group.members() {
                assert_eq!(member.hardware_group(), Some(group));
            }
            assert_eq!(group.leader(), group.members()[0]);
        }
    }

    #[test]
    fn scalable_means_hardware() {
        for kind in CounterKind::ALL {
            assert_eq!(kind.is_scalable(), kind.hardware_group().is_some());
        }
    }

    #[test]
    fn delta_subtracts_componentwise() {
        let earlier = sample(&[(CounterKind::CpuCycles, 100), (CounterKind::PageFaults, 2)]);
        let later = sample(&[(CounterKind::CpuCycles, 350), (CounterKind::PageFaults, 5)]);
        let delta = later.delta_since(&earlier);
        assert!(delta.skewed.is_empty());
        assert_eq!(delta.snapshot.get(CounterKind::CpuCycles), Some(250));
        assert_eq!(delta.snapshot.get(CounterKind::PageFaults), Some(3));
    }

    #[test]
    fn underflow_is_flagged_not_wrapped() {
        let earlier = sample(&[(CounterKind::Instructions, 900)]);
        let later = sample(&[(CounterKind::Instructions, 400)]);
        let delta = later.delta_since(&earlier);
        assert!(delta.skewed.contains(CounterKind::Instructions));
        assert_eq!(delta.snapshot.get(CounterKind::Instructions), None);
        // Other fields are unaffected.
        assert!(delta.snapshot.is_available(CounterKind::CpuCycles));
    }

    #[test]
    fn unavailable_propagates_through_delta_and_accumulate() {
        let mut earlier = CounterSnapshot::zeroed();
        earlier.set_unavailable(CounterKind::CacheMisses);
        let later = sample(&[(CounterKind::CacheMisses, 10)]);
        let delta = later.delta_since(&earlier);
        assert_eq!(delta.snapshot.get(CounterKind::CacheMisses), None);
        assert!(delta.skewed.is_empty());

        let mut total = CounterSnapshot::zeroed();
        total.accumulate(&delta.snapshot);
        assert!(!total.is_available(CounterKind::CacheMisses));
        assert!(total.is_available(CounterKind::CpuCycles));
    }

    #[test]
    fn snapshot_differences_compose() {
        // (C − A) + (B − C) == B − A for readings taken in order A, C, B.
        let a = sample(&[(CounterKind::CpuCycles, 100), (CounterKind::TaskClock, 1_000)]);
        let c = sample(&[(CounterKind::CpuCycles, 400), (CounterKind::TaskClock, 4_000)]);
        let b = sample(&[(CounterKind::CpuCycles, 900), (CounterKind::TaskClock, 9_500)]);

        let mut composed = c.delta_since(&a).snapshot;
        composed.accumulate(&b.delta_since(&c).snapshot);
        let direct = b.delta_since(&a).snapshot;
        assert_eq!(composed, direct);
    }

    #[test]
    fn group_pairs_rederived_on_delta() {
        let mut earlier = CounterSnapshot::zeroed();
        earlier.set_group_time(
            HardwareGroup::Cycles,
            TimingPair { enabled_ns: 1_000, running_ns: 500 },
        );
        let mut later = CounterSnapshot::zeroed();
        later.set_group_time(
            HardwareGroup::Cycles,
            TimingPair { enabled_ns: 5_000, running_ns: 2_500 },
        );
        let delta = later.delta_since(&earlier);
        assert_eq!(
            delta.snapshot.group_time(HardwareGroup::Cycles),
            TimingPair { enabled_ns: 4_000, running_ns: 2_000 }
        );
    }

    #[test]
    fn derived_metrics_follow_division_rules() {
        let zero = DerivedMetrics::from_snapshot(&CounterSnapshot::zeroed());
        assert_eq!(zero.cpu_seconds, 0.0);
        assert_eq!(zero.task_idle_fraction, 0.0);
        assert_eq!(zero.major_faults_per_second, 0.0);
        assert!(zero.cycles_per_instruction.is_nan());
        assert_eq!(zero.frontend_stall_fraction, 0.0);
        assert_eq!(zero.cache_miss_fraction, 0.0);
        assert_eq!(zero.branch_miss_fraction, 0.0);

        let busy = sample(&[
            (CounterKind::CpuClock, 2_000_000_000),
            (CounterKind::TaskClock, 1_500_000_000),
            (CounterKind::MajorFaults, 4),
            (CounterKind::CpuCycles, 8_000),
            (CounterKind::Instructions, 4_000),
            (CounterKind::StallFrontend, 2_000),
            (CounterKind::StallBackend, 1_000),
            (CounterKind::CacheReferences, 100),
            (CounterKind::CacheMisses, 25),
            (CounterKind::BranchInstructions, 1_000),
            (CounterKind::BranchMisses, 10),
        ]);
        let metrics = DerivedMetrics::from_snapshot(&busy);
        assert_eq!(metrics.cpu_seconds, 2.0);
        assert_eq!(metrics.task_idle_fraction, 0.25);
        assert_eq!(metrics.major_faults_per_second, 2.0);
        assert_eq!(metrics.cycles_per_instruction, 2.0);
        assert_eq!(metrics.frontend_stall_fraction, 0.25);
        assert_eq!(metrics.backend_stall_fraction, 0.125);
        assert_eq!(metrics.cache_miss_fraction, 0.25);
        assert_eq!(metrics.branch_miss_fraction, 0.01);
    }

    #[test]
    fn fractions_are_clamped() {
        // Multiplexing scaling can make a follower exceed its leader.
        let skewed = sample(&[
            (CounterKind::CacheReferences, 10),
            (CounterKind::CacheMisses, 50),
        ]);
        let metrics = DerivedMetrics::from_snapshot(&skewed);
        assert_eq!(metrics.cache_miss_fraction, 1.0);
    }
}
