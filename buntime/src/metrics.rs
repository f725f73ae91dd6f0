//! Telemetry the Supervisor emits alongside lifecycle/output events: ring
//! occupancy (`memory`, ~10 Hz) and a syscall heatmap (`syscalls`), §4.7.
//!
//! Ring stats are plain arithmetic over the two rings' headers and need no
//! backend. The syscall heatmap needs an OS-level collector (eBPF), which is
//! Linux-root-only and out of this core's scope (§1); it is represented as a
//! pluggable trait so the Supervisor stays agnostic to collector internals,
//! mirroring the pluggable `NetworkBackend` shape in the reference net
//! module.

use std::collections::HashMap;

use crate::ring_buffer::RingBuffer;

/// Point-in-time occupancy of both rings, the payload of a `memory` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingStats {
    pub used_s2w: u32,
    pub used_w2s: u32,
    pub capacity: u32,
}

/// Compute current occupancy from the live rings.
pub fn ring_stats(s2w: &RingBuffer, w2s: &RingBuffer) -> RingStats {
    RingStats {
        used_s2w: s2w.used(),
        used_w2s: w2s.used(),
        capacity: s2w.capacity(),
    }
}

/// One observed syscall, fed into the heatmap by a collector.
#[derive(Debug, Clone)]
pub struct SyscallObservation {
    pub name: String,
    pub count: u64,
}

/// Pluggable syscall telemetry source. The Supervisor holds a
/// `Box<dyn SyscallCollector>` and polls it on its own schedule; a collector
/// that has nothing new returns an empty vector rather than erroring.
pub trait SyscallCollector: Send + Sync {
    fn poll(&mut self) -> Vec<SyscallObservation>;
}

/// No-op collector used wherever eBPF telemetry is unavailable (non-Linux,
/// unprivileged Linux). Its absence is not an error (§9).
#[derive(Debug, Default)]
pub struct NullSyscallCollector;

impl SyscallCollector for NullSyscallCollector {
    fn poll(&mut self) -> Vec<SyscallObservation> {
        Vec::new()
    }
}

/// Fold a batch of observations into the cumulative heatmap the
/// `syscalls` event carries.
pub fn merge_heatmap(heatmap: &mut HashMap<String, u64>, observations: Vec<SyscallObservation>) {
    for obs in observations {
        *heatmap.entry(obs.name).or_insert(0) += obs.count;
    }
}

#[cfg(target_os = "linux")]
pub mod ebpf {
    //! Linux-only eBPF syscall collector. Bytecode generation and map
    //! attachment are out of this core's scope (§1, §9 "eBPF telemetry is
    //! Linux-root-only"); this collector is a stub that reports nothing
    //! until wired to a real probe, so its presence never changes observed
    //! behavior without one.

    use super::{SyscallCollector, SyscallObservation};

    #[derive(Debug, Default)]
    pub struct EbpfSyscallCollector;

    impl SyscallCollector for EbpfSyscallCollector {
        fn poll(&mut self) -> Vec<SyscallObservation> {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ring_reports_zero_stats() {
        let mut backing = vec![0u8; crate::ring_buffer::HEADER_SIZE * 2 + 256];
        let ptr = backing.as_mut_ptr();
        unsafe {
            RingBuffer::init(ptr, 128);
            RingBuffer::init(ptr.add(crate::ring_buffer::HEADER_SIZE + 128), 128);
        }
        let s2w = unsafe { RingBuffer::from_region(ptr) };
        let w2s = unsafe { RingBuffer::from_region(ptr.add(crate::ring_buffer::HEADER_SIZE + 128)) };
        let stats = ring_stats(&s2w, &w2s);
        assert_eq!(stats.used_s2w, 0);
        assert_eq!(stats.used_w2s, 0);
        assert_eq!(stats.capacity, 128);
    }

    #[test]
    fn merge_heatmap_accumulates_counts_across_batches() {
        let mut heatmap = HashMap::new();
        merge_heatmap(&mut heatmap, vec![SyscallObservation { name: "openat".into(), count: 3 }]);
        merge_heatmap(&mut heatmap, vec![SyscallObservation { name: "openat".into(), count: 2 }]);
        assert_eq!(heatmap.get("openat"), Some(&5));
    }

    #[test]
    fn null_collector_always_reports_empty() {
        let mut collector = NullSyscallCollector;
        assert!(collector.poll().is_empty());
    }
}
