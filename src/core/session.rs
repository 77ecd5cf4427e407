// This module provides the arena-backed scan session using the bumpalo crate. A ScanSession
// accompanies one pass over a procedure or binary: it applies the per-instruction outcome
// policy to every rewrite result, keeps statistics (instructions lifted per mnemonic,
// invalid, unimplemented and faulted instructions, resolved trampolines) and retains a
// bounded list of diagnostic samples for unimplemented instructions. Instruction texts and
// trampoline targets are interned in the arena and share the session lifetime. Sessions are
// single-threaded; independent procedures are scanned with independent sessions.

//! Arena-based scan session management.
//!
//! Lifting one instruction never aborts a scan: the session turns rewrite
//! failures into invalid clusters and tallies them for the final report.

use super::error::{LiftError, RewriteError};
use super::memory::Address;
use super::rtl::RtlCluster;
use bumpalo::Bump;
use hashbrown::HashMap;
use std::cell::RefCell;
use std::fmt;

/// Options controlling what a scan session retains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiftOptions {
    /// Keep the text of unimplemented instructions for later triage.
    pub keep_samples: bool,
    /// Upper bound on the number of retained samples.
    pub max_samples: usize,
}

impl Default for LiftOptions {
    fn default() -> Self {
        Self {
            keep_samples: true,
            max_samples: 100,
        }
    }
}

/// An instruction that could not be lifted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrSample<'arena> {
    pub address: Address,
    pub text: &'arena str,
    pub reason: &'arena str,
}

/// A trampoline resolved during the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrampolineRecord<'arena> {
    pub site: Address,
    pub target: &'arena str,
}

/// Arena-based scan session.
pub struct ScanSession<'arena> {
    arena: &'arena Bump,
    options: LiftOptions,
    stats: RefCell<ScanStats>,
    interned_strings: RefCell<HashMap<String, &'arena str>>,
    invalid: RefCell<Vec<InstrSample<'arena>>>,
    samples: RefCell<Vec<InstrSample<'arena>>>,
    faults: RefCell<Vec<InstrSample<'arena>>>,
    trampolines: RefCell<Vec<TrampolineRecord<'arena>>>,
}

impl<'arena> ScanSession<'arena> {
    pub fn new(arena: &'arena Bump) -> Self {
        Self::with_options(arena, LiftOptions::default())
    }

    pub fn with_options(arena: &'arena Bump, options: LiftOptions) -> Self {
        Self {
            arena,
            options,
            stats: RefCell::new(ScanStats::default()),
            interned_strings: RefCell::new(HashMap::new()),
            invalid: RefCell::new(Vec::new()),
            samples: RefCell::new(Vec::new()),
            faults: RefCell::new(Vec::new()),
            trampolines: RefCell::new(Vec::new()),
        }
    }

    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    pub fn options(&self) -> LiftOptions {
        self.options
    }

    /// Intern a string in the arena.
    pub fn intern_str(&self, s: &str) -> &'arena str {
        let mut strings = self.interned_strings.borrow_mut();
        if let Some(&interned) = strings.get(s) {
            return interned;
        }

        let interned = self.arena.alloc_str(s);
        strings.insert(s.to_string(), interned);
        interned
    }

    /// Lift one instruction and apply the outcome policy.
    ///
    /// `rewrite` produces the instruction's RTL. Malformed and unimplemented
    /// instructions become invalid clusters; contract violations are logged
    /// and recorded, and also become invalid clusters so the scan continues.
    pub fn lift<F>(&self, address: Address, length: u32, text: &str, mnemonic: &str, rewrite: F) -> RtlCluster
    where
        F: FnOnce() -> Result<RtlCluster, RewriteError>,
    {
        match rewrite() {
            Ok(cluster) if cluster.is_invalid() => {
                self.record_invalid(address, text, "marked invalid by rewriter");
                cluster
            }
            Ok(cluster) => {
                self.record_lifted(mnemonic);
                cluster
            }
            Err(err) => {
                let reason = err.to_string();
                match err {
                    RewriteError::Malformed { .. } => {
                        log::debug!("{address}: {text}: {reason}");
                        self.record_invalid(address, text, &reason);
                    }
                    RewriteError::Unimplemented { .. } => {
                        log::warn!("{address}: {text}: {reason}");
                        self.record_unimplemented(address, text, &reason);
                    }
                    RewriteError::Fault { .. } => {
                        let err = LiftError::ContractViolation {
                            address,
                            reason: reason.clone(),
                        };
                        log::error!("{err} ({text})");
                        self.record_fault(address, text, &reason);
                    }
                }
                RtlCluster::invalid(address, length)
            }
        }
    }

    fn sample(&self, address: Address, text: &str, reason: &str) -> InstrSample<'arena> {
        InstrSample {
            address,
            text: self.intern_str(text),
            reason: self.intern_str(reason),
        }
    }

    /// Record a successfully lifted instruction.
    pub fn record_lifted(&self, mnemonic: &str) {
        let mut stats = self.stats.borrow_mut();
        stats.instructions_lifted += 1;
        *stats
            .mnemonic_counts
            .entry(mnemonic.to_string())
            .or_insert(0) += 1;
    }

    /// Record an instruction lifted to an invalid marker.
    pub fn record_invalid(&self, address: Address, text: &str, reason: &str) {
        self.stats.borrow_mut().invalid += 1;
        let sample = self.sample(address, text, reason);
        self.invalid.borrow_mut().push(sample);
    }

    /// Record an instruction with no rewriter, keeping a sample if allowed.
    pub fn record_unimplemented(&self, address: Address, text: &str, reason: &str) {
        {
            let mut stats = self.stats.borrow_mut();
            stats.invalid += 1;
            stats.unimplemented += 1;
        }
        let sample = self.sample(address, text, reason);
        self.invalid.borrow_mut().push(sample);
        let mut samples = self.samples.borrow_mut();
        if self.options.keep_samples && samples.len() < self.options.max_samples {
            samples.push(sample);
        }
    }

    /// Record a rewriter contract violation.
    pub fn record_fault(&self, address: Address, text: &str, reason: &str) {
        {
            let mut stats = self.stats.borrow_mut();
            stats.invalid += 1;
            stats.faults += 1;
        }
        let sample = self.sample(address, text, reason);
        self.invalid.borrow_mut().push(sample);
        self.faults.borrow_mut().push(sample);
    }

    /// Record a trampoline resolved at `site`.
    pub fn record_trampoline(&self, site: Address, target: &str) {
        log::debug!("Trampoline at {site} resolved to {target}");
        self.stats.borrow_mut().trampolines_resolved += 1;
        let record = TrampolineRecord {
            site,
            target: self.intern_str(target),
        };
        self.trampolines.borrow_mut().push(record);
    }

    pub fn stats(&self) -> ScanStats {
        self.stats.borrow().clone()
    }

    /// Every instruction that lifted to an invalid marker, in scan order.
    pub fn invalid_instructions(&self) -> Vec<InstrSample<'arena>> {
        self.invalid.borrow().clone()
    }

    pub fn samples(&self) -> Vec<InstrSample<'arena>> {
        self.samples.borrow().clone()
    }

    pub fn faults(&self) -> Vec<InstrSample<'arena>> {
        self.faults.borrow().clone()
    }

    pub fn trampolines(&self) -> Vec<TrampolineRecord<'arena>> {
        self.trampolines.borrow().clone()
    }

    /// Render the end-of-scan report.
    pub fn report(&self) -> String {
        let mut out = self.stats().to_string();
        let invalid = self.invalid.borrow();
        if !invalid.is_empty() {
            out.push_str("  Invalid instructions:\n");
            for s in invalid.iter() {
                out.push_str(&format!("    {}: {} ({})\n", s.address, s.text, s.reason));
            }
        }
        let trampolines = self.trampolines.borrow();
        if !trampolines.is_empty() {
            out.push_str("  Trampolines:\n");
            for t in trampolines.iter() {
                out.push_str(&format!("    {} -> {}\n", t.site, t.target));
            }
        }
        out
    }
}

/// Scan statistics.
#[derive(Debug, Default, Clone)]
pub struct ScanStats {
    /// Instructions lifted to valid RTL.
    pub instructions_lifted: usize,

    /// Count of each mnemonic lifted.
    pub mnemonic_counts: HashMap<String, usize>,

    /// Instructions lifted to an invalid marker, for any reason.
    pub invalid: usize,

    /// Instructions with no rewriter.
    pub unimplemented: usize,

    /// Rewriter contract violations.
    pub faults: usize,

    pub trampolines_resolved: usize,
}

impl fmt::Display for ScanStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scan Session Statistics:")?;
        writeln!(f, "  Instructions lifted: {}", self.instructions_lifted)?;
        writeln!(f, "  Invalid instructions: {}", self.invalid)?;
        writeln!(f, "  Unimplemented: {}", self.unimplemented)?;
        writeln!(f, "  Contract violations: {}", self.faults)?;
        writeln!(f, "  Trampolines resolved: {}", self.trampolines_resolved)?;

        if !self.mnemonic_counts.is_empty() {
            writeln!(f, "  Instruction breakdown:")?;
            let mut sorted: Vec<_> = self.mnemonic_counts.iter().collect();
            sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

            for (mnemonic, count) in sorted.into_iter().take(10) {
                writeln!(f, "    {}: {}", mnemonic, count)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rtl::{InstrClass, RtlStatement};

    fn ok_cluster(address: Address) -> RtlCluster {
        let mut c = RtlCluster::invalid(address, 4);
        c.class = InstrClass::Linear;
        c.instrs = vec![RtlStatement::Nop];
        c
    }

    #[test]
    fn test_scan_session_creation() {
        let arena = Bump::new();
        let session = ScanSession::new(&arena);

        let stats = session.stats();
        assert_eq!(stats.instructions_lifted, 0);
        assert_eq!(stats.invalid, 0);
        assert!(session.options().keep_samples);
    }

    #[test]
    fn test_string_interning() {
        let arena = Bump::new();
        let session = ScanSession::new(&arena);

        let s1 = session.intern_str("vbic.i32 d0, d1, d2");
        let s2 = session.intern_str("vbic.i32 d0, d1, d2");
        let s3 = session.intern_str("vdup.32 q0, r1");

        assert_eq!(s1.as_ptr(), s2.as_ptr());
        assert_ne!(s1.as_ptr(), s3.as_ptr());
    }

    #[test]
    fn test_outcome_policy() {
        let _ = env_logger::builder().is_test(true).try_init();
        let arena = Bump::new();
        let session = ScanSession::new(&arena);
        let a = Address::ptr32(0x1000);

        let c = session.lift(a, 4, "vorr d0, d1, d2", "vorr", || Ok(ok_cluster(a)));
        assert!(!c.is_invalid());

        let c = session.lift(a.offset(4), 4, "vfoo d0", "vfoo", || {
            Err(RewriteError::Unimplemented {
                mnemonic: "vfoo".into(),
                detail: String::new(),
            })
        });
        assert!(c.is_invalid());

        let c = session.lift(a.offset(8), 4, "vld1.32 {d0}, [r1]!", "vld1", || {
            Err(RewriteError::fault("writeback with index register"))
        });
        assert_eq!(c.instrs, vec![RtlStatement::Invalid]);

        let c = session.lift(a.offset(12), 4, "vld1.32 {d0}, [#4]", "vld1", || {
            Err(RewriteError::malformed("no base register"))
        });
        assert!(c.is_invalid());

        let stats = session.stats();
        assert_eq!(stats.instructions_lifted, 1);
        assert_eq!(stats.invalid, 3);
        assert_eq!(stats.unimplemented, 1);
        assert_eq!(stats.faults, 1);
        assert_eq!(session.samples().len(), 1);
        assert_eq!(session.faults()[0].address, a.offset(8));
        assert_eq!(session.invalid_instructions().len(), 3);
    }

    #[test]
    fn test_sample_cap() {
        let arena = Bump::new();
        let options = LiftOptions {
            keep_samples: true,
            max_samples: 2,
        };
        let session = ScanSession::with_options(&arena, options);
        for i in 0..5 {
            session.record_unimplemented(Address::ptr32(i * 4), "vfoo", "no rewriter");
        }
        assert_eq!(session.samples().len(), 2);
        assert_eq!(session.stats().unimplemented, 5);

        let session = ScanSession::with_options(
            &arena,
            LiftOptions {
                keep_samples: false,
                max_samples: 10,
            },
        );
        session.record_unimplemented(Address::ptr32(0), "vfoo", "no rewriter");
        assert!(session.samples().is_empty());
    }

    #[test]
    fn test_report() {
        let arena = Bump::new();
        let session = ScanSession::new(&arena);
        session.record_lifted("vbic");
        session.record_lifted("vbic");
        session.record_lifted("vdup");
        session.record_trampoline(Address::ptr32(0x10A9C), "00075488");
        let report = session.report();
        assert!(report.contains("Instructions lifted: 3"));
        assert!(report.contains("vbic: 2"));
        assert!(report.contains("00010A9C -> 00075488"));
    }
}
