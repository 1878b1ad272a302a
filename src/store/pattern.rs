//! Multi-channel pattern search.
//!
//! A [`Pattern`] is a conjunction of per-channel [`Term`]s evaluated at a
//! single index `i` from `sample(i)` and `sample(i - 1)`. Terms are written
//! with one character each:
//!
//! | char | term | matches at `i` when |
//! |------|------|---------------------|
//! | `X` | don't care | always |
//! | `0` | low | `s[i] == 0` |
//! | `1` | high | `s[i] == 1` |
//! | `R` | rising | `s[i-1] == 0 && s[i] == 1` |
//! | `F` | falling | `s[i-1] == 1 && s[i] == 0` |
//! | `C` | any edge | `s[i-1] != s[i]` |
//!
//! Edge terms never match at index 0.
//!
//! The scan does not visit every index: when a term fails at `i`, the next
//! index where it could hold is the channel's next edge (previous edge when
//! searching backward), so the cursor jumps to the furthest such index over
//! all failing terms.

use super::snapshot::{LogicSnapshot, SnapshotInner};
use crate::error::{Result, StoreError};
use std::sync::atomic::{AtomicBool, Ordering};

/// Samples scanned between two acquisitions of the snapshot lock.
pub const PATTERN_LOCK_SLICE: u64 = 1 << 20;

/// Condition on one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Term {
    #[default]
    DontCare,
    Low,
    High,
    Rising,
    Falling,
    AnyEdge,
}

impl Term {
    /// Parse one of `X 0 1 R F C` (case insensitive).
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'X' => Some(Term::DontCare),
            '0' => Some(Term::Low),
            '1' => Some(Term::High),
            'R' => Some(Term::Rising),
            'F' => Some(Term::Falling),
            'C' => Some(Term::AnyEdge),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            Term::DontCare => 'X',
            Term::Low => '0',
            Term::High => '1',
            Term::Rising => 'R',
            Term::Falling => 'F',
            Term::AnyEdge => 'C',
        }
    }

    pub fn is_edge(&self) -> bool {
        matches!(self, Term::Rising | Term::Falling | Term::AnyEdge)
    }

    /// Evaluate with `prev = None` at index 0.
    pub fn matches(&self, prev: Option<bool>, cur: bool) -> bool {
        match self {
            Term::DontCare => true,
            Term::Low => !cur,
            Term::High => cur,
            Term::Rising => prev == Some(false) && cur,
            Term::Falling => prev == Some(true) && !cur,
            Term::AnyEdge => prev.is_some_and(|p| p != cur),
        }
    }
}

impl std::fmt::Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Conjunction of channel terms plus a start offset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pattern {
    terms: Vec<(u16, Term)>,
    /// Indices skipped at the start of the scan.
    pub skip: u64,
}

impl Pattern {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the term of `channel`.
    pub fn with(mut self, channel: u16, term: Term) -> Self {
        self.terms.retain(|(c, _)| *c != channel);
        self.terms.push((channel, term));
        self
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    /// Build a pattern from one term character per channel.
    ///
    /// ```ignore
    /// let pattern = Pattern::parse(&[0, 1, 2], "1RX")?;
    /// ```
    pub fn parse(channels: &[u16], text: &str) -> Result<Self> {
        let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
        if chars.len() != channels.len() {
            return Err(StoreError::Config(format!(
                "pattern '{}' has {} terms for {} channels",
                text,
                chars.len(),
                channels.len()
            )));
        }
        channels
            .iter()
            .zip(chars)
            .try_fold(Pattern::new(), |pattern, (channel, c)| {
                let term = Term::from_char(c).ok_or_else(|| {
                    StoreError::Config(format!("invalid pattern character '{}'", c))
                })?;
                Ok(pattern.with(*channel, term))
            })
    }

    /// Terms that constrain the match.
    pub fn terms(&self) -> impl Iterator<Item = (u16, Term)> + '_ {
        self.terms
            .iter()
            .copied()
            .filter(|(_, term)| *term != Term::DontCare)
    }
}

/// Outcome of one locked slice of a scan.
enum Step {
    Found(u64),
    Exhausted,
    Continue(u64),
}

impl SnapshotInner {
    fn term_holds(&self, channel: u16, term: Term, index: u64) -> Result<bool> {
        let cur = self.sample_at(channel, index)?;
        let prev = match index {
            0 => None,
            _ => Some(self.sample_at(channel, index - 1)?),
        };
        Ok(term.matches(prev, cur))
    }

    /// Scan forward from `index` for at most `PATTERN_LOCK_SLICE` samples.
    fn pattern_forward(
        &self,
        terms: &[(u16, Term)],
        index: u64,
        end: u64,
        stop: &AtomicBool,
    ) -> Result<Step> {
        let Some(last) = self.last_index() else {
            return Ok(Step::Exhausted);
        };
        let end = end.min(last);
        let slice_end = index.saturating_add(PATTERN_LOCK_SLICE);
        let mut i = index;
        while i <= end {
            if stop.load(Ordering::Relaxed) {
                return Err(StoreError::Cancelled);
            }
            if i >= slice_end {
                return Ok(Step::Continue(i));
            }
            let mut next = i;
            for &(channel, term) in terms {
                if self.term_holds(channel, term, i)? {
                    continue;
                }
                // the term can only hold again at the channel's next edge
                match self.next_edge(channel, i + 1, end, 0)? {
                    Some(edge) => next = next.max(edge),
                    None => return Ok(Step::Exhausted),
                }
            }
            if next == i {
                return Ok(Step::Found(i));
            }
            i = next;
        }
        Ok(Step::Exhausted)
    }

    /// Scan backward from `index` for at most `PATTERN_LOCK_SLICE` samples.
    fn pattern_backward(
        &self,
        terms: &[(u16, Term)],
        index: u64,
        start: u64,
        stop: &AtomicBool,
    ) -> Result<Step> {
        let Some(last) = self.last_index() else {
            return Ok(Step::Exhausted);
        };
        let mut i = index.min(last);
        if i < start {
            return Ok(Step::Exhausted);
        }
        let slice_end = i.saturating_sub(PATTERN_LOCK_SLICE);
        loop {
            if stop.load(Ordering::Relaxed) {
                return Err(StoreError::Cancelled);
            }
            if i < slice_end {
                return Ok(Step::Continue(i));
            }
            let mut next = i;
            for &(channel, term) in terms {
                if self.term_holds(channel, term, i)? {
                    continue;
                }
                let candidate = if term.is_edge() {
                    // an earlier edge strictly before i
                    match i.checked_sub(1) {
                        Some(before) => self.prev_edge(channel, before, 0)?,
                        None => None,
                    }
                } else {
                    // the level before the last edge at or before i differs
                    self.prev_edge(channel, i, 0)?.map(|edge| edge - 1)
                };
                match candidate {
                    Some(candidate) if candidate >= start => next = next.min(candidate),
                    _ => return Ok(Step::Exhausted),
                }
            }
            if next == i {
                return Ok(Step::Found(i));
            }
            i = next;
        }
    }
}

impl LogicSnapshot {
    /// Find the first index in `[start, end]` where every term of `pattern`
    /// holds.
    ///
    /// Forward searches start at `start + skip` and ascend; backward searches
    /// start at `end - skip` and descend. `stop` is polled on every step and a
    /// set flag ends the search with [`StoreError::Cancelled`]. The snapshot
    /// lock is released every [`PATTERN_LOCK_SLICE`] samples so the capture
    /// thread can keep writing.
    pub fn pattern_search(
        &self,
        pattern: &Pattern,
        start: u64,
        end: u64,
        forward: bool,
        stop: &AtomicBool,
    ) -> Result<Option<u64>> {
        let terms: Vec<(u16, Term)> = pattern.terms().collect();
        {
            let inner = self.lock();
            for (channel, _) in &terms {
                inner.channel_index(*channel)?;
            }
        }

        let mut cursor = if forward {
            start.saturating_add(pattern.skip)
        } else {
            match end.checked_sub(pattern.skip) {
                Some(cursor) => cursor,
                None => return Ok(None),
            }
        };
        if cursor < start || cursor > end {
            return Ok(None);
        }

        loop {
            let step = {
                let inner = self.lock();
                if forward {
                    inner.pattern_forward(&terms, cursor, end, stop)?
                } else {
                    inner.pattern_backward(&terms, cursor, start, stop)?
                }
            };
            match step {
                Step::Found(index) => {
                    tracing::debug!("Pattern matched at {}", index);
                    return Ok(Some(index));
                }
                Step::Exhausted => return Ok(None),
                Step::Continue(next) => cursor = next,
            }
        }
    }
}
