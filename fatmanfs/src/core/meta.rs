// SPDX-License-Identifier: MIT

/// Static layout of a cluster-addressed volume.
///
/// Implemented by the decoded boot-record geometry; consumed by the chain
/// cursor and the FAT helpers so they never touch raw boot-record fields.
pub trait FsMeta<Unit: Ord + Copy> {
    /// First addressable data unit.
    fn first_data_unit(&self) -> Unit;

    /// Last addressable data unit (inclusive).
    fn last_data_unit(&self) -> Unit;

    /// Number of data units.
    fn total_units(&self) -> usize;

    fn is_valid_unit(&self, unit: Unit) -> bool {
        unit >= self.first_data_unit() && unit <= self.last_data_unit()
    }
}
