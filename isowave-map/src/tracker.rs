/*!
Sweep-line tracking of committed seeds across retention time.

Seeds arrive scan by scan in scan-index order. Each one joins the nearest open box within
half an isotope spacing at the maximum charge, or opens a new box. After every scan the
open boxes that have not been extended recently are retired, either into the closed set
when they have been seen in enough scans, or dropped.

When a run is split into chunks, boxes that touch a chunk boundary cannot be judged
locally. Those are parked in the front and end sets until [`BoxTracker::merge_features`]
joins the trackers of neighboring chunks.
*/
use tracing::{debug, trace};

use isowave::boxes::{BoxElement, BoxMap, IsotopeBox};
use isowave::wavelet::HALF_NEUTRON_MASS;

fn starts_near(front_bound: Option<usize>, isobox: &IsotopeBox, gap: usize) -> bool {
    match (front_bound, isobox.first_scan()) {
        (Some(front), Some(first)) => first.saturating_sub(front) <= gap,
        _ => false,
    }
}

#[derive(Debug, Clone)]
pub struct BoxTracker {
    open: BoxMap,
    closed: BoxMap,
    front: BoxMap,
    end: BoxMap,
    /// How many scans a box may go unobserved before it is retired
    pub rt_interleave: usize,
    /// How many observations a retired box needs to be kept
    pub rt_votes_cutoff: usize,
    /// The first scan of this tracker's chunk, if a chunk precedes it
    pub front_bound: Option<usize>,
    /// The last scan of this tracker's chunk, if a chunk follows it
    pub end_bound: Option<usize>,
}

impl BoxTracker {
    pub fn new(max_charge: u32, rt_interleave: usize, rt_votes_cutoff: usize) -> Self {
        let dist = HALF_NEUTRON_MASS / max_charge.max(1) as f64;
        Self {
            open: BoxMap::new(dist),
            closed: BoxMap::new(dist),
            front: BoxMap::new(dist),
            end: BoxMap::new(dist),
            rt_interleave,
            rt_votes_cutoff,
            front_bound: None,
            end_bound: None,
        }
    }

    pub fn with_bounds(mut self, front_bound: Option<usize>, end_bound: Option<usize>) -> Self {
        self.front_bound = front_bound;
        self.end_bound = end_bound;
        self
    }

    pub fn dist_constraint(&self) -> f64 {
        self.open.dist_constraint
    }

    pub fn insert(&mut self, element: BoxElement) {
        self.open.push(element);
    }

    pub fn extend<I: IntoIterator<Item = BoxElement>>(&mut self, elements: I) {
        for e in elements {
            self.insert(e);
        }
    }

    pub fn open_boxes(&self) -> &BoxMap {
        &self.open
    }

    pub fn closed_boxes(&self) -> &BoxMap {
        &self.closed
    }

    pub fn front_boxes(&self) -> &BoxMap {
        &self.front
    }

    pub fn end_boxes(&self) -> &BoxMap {
        &self.end
    }

    /// Remove the closed boxes in key order
    pub fn drain_closed(&mut self) -> Vec<IsotopeBox> {
        self.closed.drain().collect()
    }

    fn max_gap(&self) -> usize {
        self.rt_interleave + 1
    }

    fn near_front(&self, isobox: &IsotopeBox) -> bool {
        starts_near(self.front_bound, isobox, self.max_gap())
    }

    fn retire(&mut self, isobox: IsotopeBox) {
        if isobox.len() >= self.rt_votes_cutoff {
            self.closed.insert_box(isobox);
        } else {
            trace!(
                "Dropping box at {:0.3} with {} entries",
                isobox.key_mz(),
                isobox.len()
            );
        }
    }

    /// Retire the open boxes that can no longer be extended once `scan_index` has
    /// been processed.
    ///
    /// On the last scan of the run every open box is retired. On the last scan of a
    /// chunk that is followed by another, every open box is parked as an end box.
    pub fn update_box_states(&mut self, scan_index: usize, is_last_scan: bool) {
        if self.end_bound == Some(scan_index) && !is_last_scan {
            let parked: Vec<_> = self.open.drain().collect();
            for isobox in parked {
                self.end.insert_box(isobox);
            }
            debug!(
                "Parked open boxes at chunk end {scan_index}, {} end boxes",
                self.end.len()
            );
            return;
        }

        let gap = self.max_gap();
        let retired = self.open.extract_if(|b| {
            is_last_scan
                || b.last_scan()
                    .is_some_and(|last| scan_index.saturating_sub(last) > gap)
        });
        for isobox in retired {
            if self.near_front(&isobox) {
                self.front.insert_box(isobox);
            } else {
                self.retire(isobox);
            }
        }
    }

    /// Join the boundary boxes of the chunk immediately after this tracker's into this
    /// tracker, which then covers both chunks.
    ///
    /// An end box here is extended by the nearest front box of `later` it can reach
    /// within the scan gap, or by a box of `later` that stayed open through its whole
    /// chunk. Boxes left unmatched are retired.
    pub fn merge_features(&mut self, mut later: BoxTracker) {
        let gap = self.max_gap();

        // Boxes that were still open when `later` reached its own end bound and that
        // started at its front bound span the whole chunk
        let mut spanning = BoxMap::new(later.dist_constraint());
        let (later_front, later_gap) = (later.front_bound, later.max_gap());
        for isobox in later.end.extract_if(|b| starts_near(later_front, b, later_gap)) {
            spanning.insert_box(isobox);
        }

        let earlier_end: Vec<IsotopeBox> = self.end.drain().collect();
        let mut n_joined = 0usize;
        for mut isobox in earlier_end {
            let key = isobox.key_mz();
            let last = isobox.last_scan().unwrap_or_default();
            let reachable =
                |b: &IsotopeBox| b.first_scan().is_some_and(|first| first.saturating_sub(last) <= gap);

            if let Some(i) = later
                .front
                .find_nearest(key)
                .filter(|i| later.front.get(*i).is_some_and(reachable))
            {
                isobox.extend(later.front.remove(i));
                n_joined += 1;
                self.retire(isobox);
            } else if let Some(i) = spanning
                .find_nearest(key)
                .filter(|i| spanning.get(*i).is_some_and(reachable))
            {
                isobox.extend(spanning.remove(i));
                n_joined += 1;
                if later.end_bound.is_some() {
                    self.end.insert_box(isobox);
                } else {
                    self.retire(isobox);
                }
            } else {
                self.retire(isobox);
            }
        }

        let unmatched_front: Vec<_> = later.front.drain().collect();
        for isobox in unmatched_front {
            self.retire(isobox);
        }
        for isobox in spanning.drain().chain(later.end.drain()) {
            if later.end_bound.is_some() {
                self.end.insert_box(isobox);
            } else {
                self.retire(isobox);
            }
        }
        for isobox in later.closed.drain() {
            self.closed.insert_box(isobox);
        }
        for isobox in later.open.drain() {
            self.open.insert_box(isobox);
        }
        debug!(
            "Joined {n_joined} boxes across the boundary at scan {:?}, {} closed boxes",
            later.front_bound,
            self.closed.len()
        );
        self.end_bound = later.end_bound;
    }
}
