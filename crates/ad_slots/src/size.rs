//! Ad sizes, viewport breakpoints and the breakpoint resolver.

use core::cmp::Reverse;
use core::fmt;
use serde::Deserialize;

/// Size returned when no breakpoint applies to the viewport.
pub const FALLBACK_SIZE: Size = Size {
    width: 300,
    height: 250,
};

/// A creative size in CSS pixels. Both dimensions are non-zero.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "SizeRepr")]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    /// Build a size, rejecting zero dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            None
        } else {
            Some(Self { width, height })
        }
    }

    pub const fn is_valid(self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// The `[width, height]` pair ad services expect.
    pub const fn as_pair(self) -> [u32; 2] {
        [self.width, self.height]
    }
}

impl fmt::Display for Size {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}x{}", self.width, self.height)
    }
}

/// Accepted wire forms: `[728, 90]` or `{"width": 728, "height": 90}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum SizeRepr {
    Pair([u32; 2]),
    Object { width: u32, height: u32 },
}

impl TryFrom<SizeRepr> for Size {
    type Error = String;

    fn try_from(repr: SizeRepr) -> Result<Self, Self::Error> {
        let (width, height) = match repr {
            SizeRepr::Pair([width, height]) | SizeRepr::Object { width, height } => {
                (width, height)
            }
        };
        Self::new(width, height).ok_or_else(|| format!("invalid ad size {width}x{height}"))
    }
}

/// Sizes allowed from a minimum viewport width upwards.
///
/// An empty `sizes` list means no ad is shown at this breakpoint.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "BreakpointRepr")]
pub struct Breakpoint {
    pub min_width: u32,
    pub sizes: Vec<Size>,
}

impl Breakpoint {
    pub fn new(min_width: u32, sizes: impl Into<Vec<Size>>) -> Self {
        Self {
            min_width,
            sizes: sizes.into(),
        }
    }
}

/// Accepted wire forms: `{"minWidth": 750, "sizes": [...]}` or the
/// ad-service style `{"viewport": [750, 0], "sizes": [...]}` (height ignored).
#[derive(Deserialize)]
#[serde(untagged)]
enum BreakpointRepr {
    MinWidth {
        #[serde(rename = "minWidth")]
        min_width: u32,
        sizes: Vec<Size>,
    },
    Viewport {
        viewport: [u32; 2],
        sizes: Vec<Size>,
    },
}

impl From<BreakpointRepr> for Breakpoint {
    fn from(repr: BreakpointRepr) -> Self {
        match repr {
            BreakpointRepr::MinWidth { min_width, sizes } => Self { min_width, sizes },
            BreakpointRepr::Viewport {
                viewport: [min_width, _],
                sizes,
            } => Self { min_width, sizes },
        }
    }
}

/// Ordered breakpoints for one position, in the order they were registered.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Vec<Breakpoint>")]
pub struct SizeMapping {
    breakpoints: Vec<Breakpoint>,
}

impl From<Vec<Breakpoint>> for SizeMapping {
    fn from(breakpoints: Vec<Breakpoint>) -> Self {
        Self { breakpoints }
    }
}

impl SizeMapping {
    pub const fn new(breakpoints: Vec<Breakpoint>) -> Self {
        Self { breakpoints }
    }

    pub fn breakpoints(&self) -> &[Breakpoint] {
        &self.breakpoints
    }

    pub const fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }

    /// Non-empty and every listed size has non-zero dimensions.
    pub fn is_valid(&self) -> bool {
        !self.breakpoints.is_empty()
            && self
                .breakpoints
                .iter()
                .all(|breakpoint| breakpoint.sizes.iter().all(|size| size.is_valid()))
    }

    /// Whether any breakpoint allows at least one size.
    pub fn has_sizes(&self) -> bool {
        self.breakpoints
            .iter()
            .any(|breakpoint| !breakpoint.sizes.is_empty())
    }

    /// Breakpoints ordered by descending `min_width`.
    ///
    /// Breakpoints sharing a `min_width` are ordered last-registered first, so
    /// the most recently registered one wins resolution.
    pub fn sorted(&self) -> Vec<&Breakpoint> {
        let mut ordered: Vec<(usize, &Breakpoint)> = self.breakpoints.iter().enumerate().collect();
        ordered.sort_by_key(|&(index, breakpoint)| (Reverse(breakpoint.min_width), Reverse(index)));
        ordered.into_iter().map(|(_, breakpoint)| breakpoint).collect()
    }
}

/// Sizes applicable at `viewport_width`.
///
/// Returns the sizes of the breakpoint with the largest `min_width` not above
/// the viewport, or [`FALLBACK_SIZE`] alone when every breakpoint is wider
/// than the viewport.
pub fn resolve(mapping: &SizeMapping, viewport_width: u32) -> Vec<Size> {
    mapping
        .sorted()
        .into_iter()
        .find(|breakpoint| breakpoint.min_width <= viewport_width)
        .map_or_else(|| vec![FALLBACK_SIZE], |breakpoint| breakpoint.sizes.clone())
}
