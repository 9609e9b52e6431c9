//! Kernel performance counters through the perf_event subsystem.
//!
//! All events are opened for the calling thread (`pid 0, cpu -1`), so counts
//! follow the task across CPUs and stop while it is descheduled. Kernel and
//! hypervisor samples are excluded and every event starts disabled; reset and
//! enable go through the group leader with `PERF_IOC_FLAG_GROUP` so a group
//! starts counting atomically.
//!
//! Hardware events share PMU slots, so the kernel may multiplex them. Each
//! read therefore requests `time_enabled`/`time_running` and scales the raw
//! count by their ratio; an event that never ran reports as unavailable
//! rather than as zero.
//!
//! Opening the full set may fail for reasons outside our control —
//! `kernel.perf_event_paranoid`, seccomp, missing PMU in VMs. Any open error
//! is fatal for the provider: the caller falls back to the no-op provider
//! and instrumentation continues with wall-clock timing only.

use std::io;
use std::mem;
use std::os::unix::io::RawFd;
use std::time::Instant;

use gnomon_core::snapshot::{CounterKind, CounterSnapshot, HardwareGroup, TimingPair};
use perf_event_open_sys as sys;

use super::{CounterFault, CounterProvider};

/// Software events opened as independent singletons.
const SOFTWARE_KINDS: [CounterKind; 9] = [
    CounterKind::CpuClock,
    CounterKind::TaskClock,
    CounterKind::PageFaults,
    CounterKind::ContextSwitches,
    CounterKind::CpuMigrations,
    CounterKind::MinorFaults,
    CounterKind::MajorFaults,
    CounterKind::AlignmentFaults,
    CounterKind::EmulationFaults,
];

fn event_codes(kind: CounterKind) -> (u32, u32) {
    use sys::bindings as b;
    match kind {
        // Wall duration is read from the monotonic clock, never opened as a
        // kernel event.
        CounterKind::WallDuration => (b::PERF_TYPE_SOFTWARE, b::PERF_COUNT_SW_DUMMY),
        CounterKind::CpuClock => (b::PERF_TYPE_SOFTWARE, b::PERF_COUNT_SW_CPU_CLOCK),
        CounterKind::TaskClock => (b::PERF_TYPE_SOFTWARE, b::PERF_COUNT_SW_TASK_CLOCK),
        CounterKind::PageFaults => (b::PERF_TYPE_SOFTWARE, b::PERF_COUNT_SW_PAGE_FAULTS),
        CounterKind::ContextSwitches => {
            (b::PERF_TYPE_SOFTWARE, b::PERF_COUNT_SW_CONTEXT_SWITCHES)
        }
        CounterKind::CpuMigrations => (b::PERF_TYPE_SOFTWARE, b::PERF_COUNT_SW_CPU_MIGRATIONS),
        CounterKind::MinorFaults => (b::PERF_TYPE_SOFTWARE, b::PERF_COUNT_SW_PAGE_FAULTS_MIN),
        CounterKind::MajorFaults => (b::PERF_TYPE_SOFTWARE, b::PERF_COUNT_SW_PAGE_FAULTS_MAJ),
        CounterKind::AlignmentFaults => {
            (b::PERF_TYPE_SOFTWARE, b::PERF_COUNT_SW_ALIGNMENT_FAULTS)
        }
        CounterKind::EmulationFaults => {
            (b::PERF_TYPE_SOFTWARE, b::PERF_COUNT_SW_EMULATION_FAULTS)
        }
        CounterKind::CpuCycles => (b::PERF_TYPE_HARDWARE, b::PERF_COUNT_HW_CPU_CYCLES),
        CounterKind::Instructions => (b::PERF_TYPE_HARDWARE, b::PERF_COUNT_HW_INSTRUCTIONS),
        CounterKind::StallFrontend => {
            (b::PERF_TYPE_HARDWARE, b::PERF_COUNT_HW_STALLED_CYCLES_FRONTEND)
        }
        CounterKind::StallBackend => {
            (b::PERF_TYPE_HARDWARE, b::PERF_COUNT_HW_STALLED_CYCLES_BACKEND)
        }
        CounterKind::CacheReferences => {
            (b::PERF_TYPE_HARDWARE, b::PERF_COUNT_HW_CACHE_REFERENCES)
        }
        CounterKind::CacheMisses => (b::PERF_TYPE_HARDWARE, b::PERF_COUNT_HW_CACHE_MISSES),
        CounterKind::BranchInstructions => {
            (b::PERF_TYPE_HARDWARE, b::PERF_COUNT_HW_BRANCH_INSTRUCTIONS)
        }
        CounterKind::BranchMisses => (b::PERF_TYPE_HARDWARE, b::PERF_COUNT_HW_BRANCH_MISSES),
    }
}

/// Raw reading of one event: value, time_enabled, time_running.
struct ScaledRead {
    value: u64,
    available: bool,
    pair: TimingPair,
}

/// One perf_event file descriptor.
struct PerfEvent {
    kind: CounterKind,
    fd: RawFd,
}

impl PerfEvent {
    fn open(kind: CounterKind, group_fd: RawFd) -> Result<PerfEvent, CounterFault> {
        let (event_type, config) = event_codes(kind);
        let mut attr: sys::bindings::perf_event_attr = unsafe { mem::zeroed() };
        attr.size = mem::size_of::<sys::bindings::perf_event_attr>() as u32;
        attr.type_ = event_type;
        attr.config = config as u64;
        attr.read_format = (sys::bindings::PERF_FORMAT_TOTAL_TIME_ENABLED
            | sys::bindings::PERF_FORMAT_TOTAL_TIME_RUNNING) as u64;
        attr.set_disabled(1);
        attr.set_exclude_kernel(1);
        attr.set_exclude_hv(1);

        // pid 0, cpu -1: the calling thread on any CPU, state saved and
        // restored across context switches.
        let fd = unsafe { sys::perf_event_open(&mut attr, 0, -1, group_fd, 0) };
        if fd < 0 {
            return Err(fault("open", kind, io::Error::last_os_error()));
        }
        Ok(PerfEvent { kind, fd })
    }

    fn reset(&self, grouped: bool) -> io::Result<()> {
        check_ioctl(unsafe { sys::ioctls::RESET(self.fd, group_flag(grouped)) })
    }

    fn enable(&self, grouped: bool) -> io::Result<()> {
        check_ioctl(unsafe { sys::ioctls::ENABLE(self.fd, group_flag(grouped)) })
    }

    fn disable(&self, grouped: bool) -> io::Result<()> {
        check_ioctl(unsafe { sys::ioctls::DISABLE(self.fd, group_flag(grouped)) })
    }

    /// Read the counter, scaled for multiplexing.
    ///
    /// When the event ran for only part of its enabled time the raw count is
    /// scaled by `enabled/running`; an event that never ran is unavailable.
    fn read_scaled(&self) -> io::Result<ScaledRead> {
        let mut buf = [0u64; 3];
        let wanted = mem::size_of_val(&buf);
        let got = unsafe { libc::read(self.fd, buf.as_mut_ptr().cast(), wanted) };
        if got < 0 {
            return Err(io::Error::last_os_error());
        }
        if got as usize != wanted {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "short perf counter read",
            ));
        }

        let [value, enabled, running] = buf;
        let pair = TimingPair {
            enabled_ns: enabled,
            running_ns: running,
        };
        if running == 0 {
            return Ok(ScaledRead {
                value: 0,
                available: false,
                pair,
            });
        }
        let value = if running < enabled {
            (value as f64 * (enabled as f64 / running as f64)) as u64
        } else {
            value
        };
        Ok(ScaledRead {
            value,
            available: true,
            pair,
        })
    }

    fn close(&mut self) {
        if self.fd >= 0 {
            unsafe {
                libc::close(self.fd);
            }
            self.fd = -1;
        }
    }
}

fn group_flag(grouped: bool) -> libc::c_uint {
    if grouped {
        sys::bindings::PERF_IOC_FLAG_GROUP
    } else {
        0
    }
}

fn check_ioctl(status: libc::c_int) -> io::Result<()> {
    if status < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn fault(operation: &'static str, kind: CounterKind, err: io::Error) -> CounterFault {
    CounterFault {
        operation,
        counter: kind.name(),
        detail: err.to_string(),
    }
}

/// Hardware events of one kernel scheduling group, leader first.
struct GroupEvents {
    group: HardwareGroup,
    events: Vec<PerfEvent>,
}

/// Linux perf-event provider for one thread.
pub struct PerfCounter {
    origin: Instant,
    software: Vec<PerfEvent>,
    groups: Vec<GroupEvents>,
    latched: Option<CounterFault>,
    closed: bool,
}

impl PerfCounter {
    /// Open the full event set for the calling thread.
    ///
    /// # Errors
    ///
    /// Any kernel error closes whatever was opened so far and returns the
    /// fault; the caller degrades to the no-op provider.
    pub fn open() -> Result<PerfCounter, CounterFault> {
        let mut counter = PerfCounter {
            origin: Instant::now(),
            software: Vec::with_capacity(SOFTWARE_KINDS.len()),
            groups: Vec::with_capacity(HardwareGroup::COUNT),
            latched: None,
            closed: false,
        };

        for kind in SOFTWARE_KINDS {
            match PerfEvent::open(kind, -1) {
                Ok(event) => counter.software.push(event),
                Err(fault) => {
                    counter.close();
                    return Err(fault);
                }
            }
        }

        for group in HardwareGroup::ALL {
            let mut events: Vec<PerfEvent> = Vec::with_capacity(group.members().len());
            let mut failed = None;
            for &kind in group.members() {
                let leader_fd = events.first().map_or(-1, |leader| leader.fd);
                match PerfEvent::open(kind, leader_fd) {
                    Ok(event) => events.push(event),
                    Err(fault) => {
                        failed = Some(fault);
                        break;
                    }
                }
            }
            counter.groups.push(GroupEvents { group, events });
            if let Some(fault) = failed {
                counter.close();
                return Err(fault);
            }
        }

        Ok(counter)
    }

    fn latch(&mut self, fault_value: Option<CounterFault>) {
        if self.latched.is_none() {
            self.latched = fault_value;
        }
    }
}

impl CounterProvider for PerfCounter {
    fn reset(&mut self) {
        self.origin = Instant::now();
        let mut first_fault = None;
        for event in &self.software {
            if let Err(err) = event.reset(false) {
                first_fault.get_or_insert_with(|| fault("ioctl", event.kind, err));
            }
        }
        for group in &self.groups {
            if let Some(leader) = group.events.first() {
                if let Err(err) = leader.reset(true) {
                    first_fault.get_or_insert_with(|| fault("ioctl", leader.kind, err));
                }
            }
        }
        self.latch(first_fault);
    }

    fn enable(&mut self) {
        let mut first_fault = None;
        for event in &self.software {
            if let Err(err) = event.enable(false) {
                first_fault.get_or_insert_with(|| fault("ioctl", event.kind, err));
            }
        }
        for group in &self.groups {
            if let Some(leader) = group.events.first() {
                if let Err(err) = leader.enable(true) {
                    first_fault.get_or_insert_with(|| fault("ioctl", leader.kind, err));
                }
            }
        }
        self.latch(first_fault);
    }

    fn snapshot(&mut self) -> CounterSnapshot {
        let mut snapshot = CounterSnapshot::zeroed();
        snapshot.set(
            CounterKind::WallDuration,
            self.origin.elapsed().as_nanos() as u64,
        );

        let mut first_fault = None;
        for event in &self.software {
            match event.read_scaled() {
                Ok(read) if read.available => snapshot.set(event.kind, read.value),
                Ok(_) => snapshot.set_unavailable(event.kind),
                Err(err) => {
                    snapshot.set_unavailable(event.kind);
                    first_fault.get_or_insert_with(|| fault("read", event.kind, err));
                }
            }
        }
        for group in &self.groups {
            for (position, event) in group.events.iter().enumerate() {
                match event.read_scaled() {
                    Ok(read) => {
                        if read.available {
                            snapshot.set(event.kind, read.value);
                        } else {
                            snapshot.set_unavailable(event.kind);
                        }
                        // The leader's pair stands for the whole group; the
                        // kernel schedules members together.
                        if position == 0 {
                            snapshot.set_group_time(group.group, read.pair);
                        }
                    }
                    Err(err) => {
                        snapshot.set_unavailable(event.kind);
                        first_fault.get_or_insert_with(|| fault("read", event.kind, err));
                    }
                }
            }
        }

        self.latch(first_fault);
        snapshot
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for group in &self.groups {
            if let Some(leader) = group.events.first() {
                let _ = leader.disable(true);
            }
        }
        for event in &self.software {
            let _ = event.disable(false);
        }
        // Reverse open order: group followers before leaders, then software.
        for group in self.groups.iter_mut().rev() {
            for event in group.events.iter_mut().rev() {
                event.close();
            }
        }
        for event in self.software.iter_mut().rev() {
            event.close();
        }
    }

    fn take_fault(&mut self) -> Option<CounterFault> {
        self.latched.take()
    }
}

impl Drop for PerfCounter {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::open_provider;

    #[test]
    fn open_succeeds_or_degrades() {
        // Depending on perf_event_paranoid/seccomp this host may refuse the
        // syscall; both outcomes are supported configurations.
        match PerfCounter::open() {
            Ok(mut counter) => {
                counter.reset();
                counter.enable();
                let first = counter.snapshot();
                let second = counter.snapshot();
                assert!(
                    second.value(CounterKind::WallDuration)
                        >= first.value(CounterKind::WallDuration)
                );
                counter.close();
            }
            Err(fault) => {
                assert_eq!(fault.operation, "open");
            }
        }
    }

    #[test]
    fn provider_always_measures_wall_time() {
        let mut provider = open_provider();
        provider.reset();
        provider.enable();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let snapshot = provider.snapshot();
        assert!(snapshot.value(CounterKind::WallDuration) >= 2_000_000);
        provider.close();
    }

    #[test]
    fn task_clock_advances_under_load_when_available() {
        let Ok(mut counter) = PerfCounter::open() else {
            return;
        };
        counter.reset();
        counter.enable();
        let mut spin: u64 = 1;
        for _ in 0..2_000_000 {
            spin = spin.wrapping_mul(6364136223846793005).wrapping_add(1);
            std::hint::black_box(spin);
        }
        let snapshot = counter.snapshot();
        if let Some(task_ns) = snapshot.get(CounterKind::TaskClock) {
            assert!(task_ns > 0);
        }
        counter.close();
    }
}
