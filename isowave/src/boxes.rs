/*!
Boxes group seeds that share a monoisotopic position, either the seeds of one scan
before they are committed, or the committed seeds of many scans that trace one
isotopic pattern across retention time.

[`BoxMap`] keeps boxes ordered by their key m/z in a sorted vector. A box's key moves
every time it absorbs a seed, so updates remove the box and re-insert it under its new key.
*/
use crate::scorer::{PatternScore, ScoreType};

/// The score attached to a seed inside a box
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SeedScore {
    /// A point sampled one isotope away from a real seed, used only to shape the
    /// local maximum search when clustering
    Helper,
    Borderline,
    Accepted(ScoreType),
}

impl SeedScore {
    /// Whether the seed came from a scored local maximum rather than a helper
    pub fn is_real(&self) -> bool {
        !matches!(self, Self::Helper)
    }

    pub fn is_borderline(&self) -> bool {
        matches!(self, Self::Borderline)
    }

    pub fn value(&self) -> ScoreType {
        match self {
            Self::Accepted(s) => *s,
            _ => 0.0,
        }
    }
}

/// Only patterns that fit can seed a box, a rejected score is handed back
impl TryFrom<PatternScore> for SeedScore {
    type Error = PatternScore;

    fn try_from(value: PatternScore) -> Result<Self, Self::Error> {
        match value {
            PatternScore::Rejected => Err(value),
            PatternScore::Borderline => Ok(Self::Borderline),
            PatternScore::Accepted(s) => Ok(Self::Accepted(s)),
        }
    }
}

/// One observation of an isotopic pattern in one scan at one charge
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoxElement {
    pub mz: f64,
    pub charge: u32,
    pub score: SeedScore,
    /// The wavelet transform's value at the seed
    pub intensity: f64,
    /// The untransformed signal's value at the seed
    pub ref_intensity: f64,
    pub time: f64,
    pub scan_index: usize,
    pub mz_begin: usize,
    pub mz_end: usize,
}

impl BoxElement {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mz: f64,
        charge: u32,
        score: SeedScore,
        intensity: f64,
        ref_intensity: f64,
        time: f64,
        scan_index: usize,
        mz_begin: usize,
        mz_end: usize,
    ) -> Self {
        Self {
            mz,
            charge,
            score,
            intensity,
            ref_intensity,
            time,
            scan_index,
            mz_begin,
            mz_end,
        }
    }
}

/// The observations of one isotopic pattern, ordered by scan index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IsotopeBox {
    entries: Vec<BoxElement>,
    weighted_mz: f64,
    weight: f64,
    mz_sum: f64,
}

impl IsotopeBox {
    pub fn new(element: BoxElement) -> Self {
        let mut this = Self::default();
        this.push(element);
        this
    }

    /// Add an entry, keeping entries ordered by scan and entries from the same scan in
    /// insertion order
    pub fn push(&mut self, element: BoxElement) {
        let w = element.intensity.abs();
        self.weighted_mz += element.mz * w;
        self.weight += w;
        self.mz_sum += element.mz;
        let i = self
            .entries
            .partition_point(|e| e.scan_index <= element.scan_index);
        self.entries.insert(i, element);
    }

    pub fn extend(&mut self, other: IsotopeBox) {
        for e in other.entries {
            self.push(e);
        }
    }

    /// The |intensity|-weighted mean m/z of the entries, or the plain mean while
    /// no entry carries any weight
    pub fn key_mz(&self) -> f64 {
        if self.weight > 0.0 {
            self.weighted_mz / self.weight
        } else if !self.entries.is_empty() {
            self.mz_sum / self.entries.len() as f64
        } else {
            0.0
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[BoxElement] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BoxElement> {
        self.entries.iter()
    }

    pub fn first_scan(&self) -> Option<usize> {
        self.entries.first().map(|e| e.scan_index)
    }

    pub fn last_scan(&self) -> Option<usize> {
        self.entries.last().map(|e| e.scan_index)
    }

    pub fn has_borderline(&self) -> bool {
        self.entries.iter().any(|e| e.score.is_borderline())
    }
}

impl<'a> IntoIterator for &'a IsotopeBox {
    type Item = &'a BoxElement;
    type IntoIter = std::slice::Iter<'a, BoxElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// A collection of [`IsotopeBox`] ordered by key m/z that merges incoming seeds into
/// the nearest box within `dist_constraint`.
#[derive(Debug, Clone, Default)]
pub struct BoxMap {
    boxes: Vec<(f64, IsotopeBox)>,
    pub dist_constraint: f64,
}

impl BoxMap {
    pub fn new(dist_constraint: f64) -> Self {
        Self {
            boxes: Vec::new(),
            dist_constraint,
        }
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &IsotopeBox)> + '_ {
        self.boxes.iter().map(|(k, b)| (*k, b))
    }

    pub fn get(&self, index: usize) -> Option<&IsotopeBox> {
        self.boxes.get(index).map(|(_, b)| b)
    }

    pub fn clear(&mut self) {
        self.boxes.clear();
    }

    /// Remove all boxes in key order
    pub fn drain(&mut self) -> impl Iterator<Item = IsotopeBox> + '_ {
        self.boxes.drain(..).map(|(_, b)| b)
    }

    /// The position of the box closest to `mz` within the distance constraint.
    ///
    /// The candidates are the last box keyed below `mz` and the first box keyed at or
    /// above it. When both are equally close, the lower one wins.
    pub fn find_nearest(&self, mz: f64) -> Option<usize> {
        let i = self.boxes.partition_point(|(k, _)| *k < mz);
        let below = i
            .checked_sub(1)
            .map(|j| (j, (mz - self.boxes[j].0).abs()));
        let above = (i < self.boxes.len()).then(|| (i, (self.boxes[i].0 - mz).abs()));
        let best = match (below, above) {
            (Some(b), Some(a)) => {
                if a.1 < b.1 {
                    a
                } else {
                    b
                }
            }
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => return None,
        };
        (best.1 < self.dist_constraint).then_some(best.0)
    }

    /// Insert a box under its current key, after any boxes with an equal key
    pub fn insert_box(&mut self, isobox: IsotopeBox) {
        let key = isobox.key_mz();
        let i = self.boxes.partition_point(|(k, _)| *k <= key);
        self.boxes.insert(i, (key, isobox));
    }

    pub fn remove(&mut self, index: usize) -> IsotopeBox {
        self.boxes.remove(index).1
    }

    /// Merge `element` into the nearest box in range, or start a new box for it
    pub fn push(&mut self, element: BoxElement) {
        match self.find_nearest(element.mz) {
            Some(i) => {
                let mut isobox = self.remove(i);
                isobox.push(element);
                self.insert_box(isobox);
            }
            None => self.insert_box(IsotopeBox::new(element)),
        }
    }

    /// Move out every box for which `predicate` returns `true`, preserving key order
    pub fn extract_if<F: FnMut(&IsotopeBox) -> bool>(&mut self, mut predicate: F) -> Vec<IsotopeBox> {
        let mut kept = Vec::with_capacity(self.boxes.len());
        let mut taken = Vec::new();
        for (k, b) in self.boxes.drain(..) {
            if predicate(&b) {
                taken.push(b);
            } else {
                kept.push((k, b));
            }
        }
        self.boxes = kept;
        taken
    }
}
