use ndarray::Axis;
use twenty_first::prelude::BFieldElement;

pub mod master_table;

/// A single row of the low-degree extended [`MasterTable`][table], as revealed
/// to the verifier.
///
/// [table]: master_table::MasterTable
pub type MasterTableRow = Vec<BFieldElement>;

/// The axis along which the rows of a table are enumerated.
pub(crate) const ROW_AXIS: Axis = Axis(0);

/// The axis along which the columns of a table are enumerated.
pub(crate) const COL_AXIS: Axis = Axis(1);
