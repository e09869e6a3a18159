//! Mapping directives and the per-level directive table
//!
//! A [`DirectiveTable`] is ordered from the outermost loop to the innermost
//! one. Every "innermost" query in the analyses relies on that order.

use serde::{Deserialize, Serialize};

use crate::dimension::{DimId, DimensionTable};

/// How a directive schedules its dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectiveClass {
    /// Iterate over time on one compute unit
    TemporalMap,
    /// Distribute across the sub-clusters of this level
    SpatialMap,
}

impl std::fmt::Display for DirectiveClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirectiveClass::TemporalMap => write!(f, "TemporalMap"),
            DirectiveClass::SpatialMap => write!(f, "SpatialMap"),
        }
    }
}

/// Binding of one dimension to a mapping class, tile size and offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    pub class: DirectiveClass,
    pub dim: DimId,
    /// Elements mapped per iteration
    pub size: i64,
    /// Distance between consecutive tile starts
    pub offset: i64,
}

impl Directive {
    pub fn temporal(dim: DimId, size: i64, offset: i64) -> Self {
        Self {
            class: DirectiveClass::TemporalMap,
            dim,
            size,
            offset,
        }
    }

    pub fn spatial(dim: DimId, size: i64, offset: i64) -> Self {
        Self {
            class: DirectiveClass::SpatialMap,
            dim,
            size,
            offset,
        }
    }

    pub fn is_spatial(&self) -> bool {
        self.class == DirectiveClass::SpatialMap
    }

    pub fn is_temporal(&self) -> bool {
        self.class == DirectiveClass::TemporalMap
    }
}

/// Ordered (outer to inner) directives of one cluster level
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectiveTable {
    directives: Vec<Directive>,
}

impl DirectiveTable {
    pub fn new(directives: Vec<Directive>) -> Self {
        Self { directives }
    }

    pub fn push(&mut self, directive: Directive) {
        self.directives.push(directive);
    }

    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    pub fn at(&self, idx: usize) -> &Directive {
        &self.directives[idx]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Directive> {
        self.directives.iter()
    }

    /// Position of the directive mapping `dim`
    pub fn index_of(&self, dim: DimId) -> Option<usize> {
        self.directives.iter().position(|d| d.dim == dim)
    }

    pub fn find(&self, dim: DimId) -> Option<&Directive> {
        self.directives.iter().find(|d| d.dim == dim)
    }

    /// Rewrite directives on output dimensions to their input dimensions
    ///
    /// A tile of `n` outputs needs `n + f - 1` inputs, where `f` is the tile of
    /// the sliding (filter) dimension at this level, or its extent when the
    /// filter is not mapped here. Offsets are kept.
    pub fn convert_to_input_centric(&mut self, dims: &DimensionTable) {
        let conversions: Vec<(usize, DimId, i64)> = dims
            .overlaps()
            .iter()
            .filter_map(|pair| {
                let output = pair.output?;
                let idx = self.index_of(output)?;
                let filter_tile = self
                    .find(pair.sliding)
                    .map(|d| d.size)
                    .unwrap_or_else(|| dims.size(pair.sliding));
                Some((idx, pair.reference, filter_tile))
            })
            .collect();

        for (idx, input, filter_tile) in conversions {
            let directive = &mut self.directives[idx];
            log::debug!(
                "Converting directive on {} to input-centric {} (filter tile {})",
                dims.name(directive.dim),
                dims.name(input),
                filter_tile
            );
            directive.dim = input;
            directive.size += filter_tile - 1;
        }
    }

    /// Append a fully unrolled temporal map for every unmapped dimension
    ///
    /// Derived output dimensions are never mapped directly and are skipped.
    pub fn complete_with(&mut self, dims: &DimensionTable) {
        for (id, dim) in dims.iter() {
            if self.find(id).is_none() && !dims.is_output_dim(id) {
                self.directives.push(Directive::temporal(id, dim.size, dim.size));
            }
        }
    }

    pub fn describe(&self, dims: &DimensionTable) -> String {
        self.directives
            .iter()
            .map(|d| format!("{}({},{}) {}", d.class, d.size, d.offset, dims.name(d.dim)))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl<'a> IntoIterator for &'a DirectiveTable {
    type Item = &'a Directive;
    type IntoIter = std::slice::Iter<'a, Directive>;

    fn into_iter(self) -> Self::IntoIter {
        self.directives.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::LayerDimension;

    fn conv_dims() -> DimensionTable {
        let mut dims = DimensionTable::new();
        dims.add(LayerDimension::new("K", 4, 1, 1));
        dims.add(LayerDimension::new("R", 3, 1, 1));
        dims.add(LayerDimension::new("Y", 10, 1, 1));
        dims.add(LayerDimension::new("Y'", 8, 1, 1));
        dims.add_overlap("Y", "R", Some("Y'"));
        dims
    }

    #[test]
    fn test_input_centric_conversion() {
        let dims = conv_dims();
        let k = dims.index_of("K").unwrap();
        let r = dims.index_of("R").unwrap();
        let y = dims.index_of("Y").unwrap();
        let oy = dims.index_of("Y'").unwrap();

        let mut table = DirectiveTable::new(vec![
            Directive::spatial(k, 1, 1),
            Directive::temporal(r, 3, 3),
            Directive::temporal(oy, 2, 2),
        ]);
        table.convert_to_input_centric(&dims);

        assert_eq!(table.at(2), &Directive::temporal(y, 4, 2));
        assert_eq!(table.index_of(oy), None);
    }

    #[test]
    fn test_complete_with_skips_outputs() {
        let dims = conv_dims();
        let k = dims.index_of("K").unwrap();
        let mut table = DirectiveTable::new(vec![Directive::spatial(k, 1, 1)]);
        table.complete_with(&dims);

        assert_eq!(table.len(), 3);
        let y = dims.index_of("Y").unwrap();
        assert_eq!(table.find(y), Some(&Directive::temporal(y, 10, 10)));
        assert!(table.find(dims.index_of("Y'").unwrap()).is_none());
    }
}
