/// Hungarian algorithm implementation for optimal assignment
///
/// Used to resolve tracker tracks claimed by several standalone muons:
/// rows are standalone tracks, columns tracker tracks, costs are fit
/// scores (lower is better).
use ndarray::ArrayView2;
use pathfinding::prelude::{kuhn_munkres_min, Matrix};
use rayon::prelude::*;

/// Fixed-point scale applied to costs before integer assignment
const COST_SCALE: f32 = 1000.0;

/// Result of Hungarian assignment algorithm
#[derive(Debug, Clone)]
pub struct AssignmentResult {
    /// Assignments as (row_idx, column_idx) pairs, in ascending row order
    pub assignments: Vec<(usize, usize)>,
    /// Indices of unassigned rows
    pub unassigned_rows: Vec<usize>,
    /// Indices of unassigned columns
    pub unassigned_columns: Vec<usize>,
    /// Total scaled cost of the accepted assignments
    pub total_cost: i64,
}

/// Hungarian assignment solver
pub struct HungarianSolver;

impl HungarianSolver {
    /// Solve assignment problem using Hungarian algorithm
    ///
    /// # Arguments
    /// * `cost_matrix` - cost_matrix\[i\]\[j\] is the cost of assigning row i to column j
    /// * `threshold` - Maximum allowed cost for a valid assignment (assignments above this are rejected)
    ///
    /// # Returns
    /// AssignmentResult containing optimal assignments and unassigned indices
    pub fn solve(cost_matrix: ArrayView2<f32>, threshold: f32) -> AssignmentResult {
        let num_rows = cost_matrix.nrows();
        let num_columns = cost_matrix.ncols();

        if num_rows == 0 || num_columns == 0 {
            return AssignmentResult {
                assignments: Vec::new(),
                unassigned_rows: (0..num_rows).collect(),
                unassigned_columns: (0..num_columns).collect(),
                total_cost: 0,
            };
        }

        // Use greedy assignment for very sparse matrices (< 25% valid entries)
        let valid_count = cost_matrix
            .iter()
            .filter(|&&x| Self::is_valid(x, threshold))
            .count();
        let total_entries = num_rows * num_columns;
        if valid_count < total_entries / 4 {
            return Self::solve_greedy(cost_matrix, threshold);
        }

        Self::solve_hungarian(cost_matrix, threshold)
    }

    /// Infinite entries never form an assignment, whatever the threshold
    fn is_valid(cost: f32, threshold: f32) -> bool {
        cost.is_finite() && cost <= threshold
    }

    fn scaled(cost: f32, max_cost: i64) -> i64 {
        if cost.is_finite() {
            ((cost * COST_SCALE) as i64).min(max_cost)
        } else {
            max_cost
        }
    }

    /// Full Hungarian algorithm implementation
    fn solve_hungarian(cost_matrix: ArrayView2<f32>, threshold: f32) -> AssignmentResult {
        let num_rows = cost_matrix.nrows();
        let num_columns = cost_matrix.ncols();

        // Ensure matrix is square by padding with dummy entries
        let size = num_rows.max(num_columns);

        // A full row of padding must still sum well inside i64
        let accept_cap = i64::MAX / 4 / (COST_SCALE as i64 * size as i64);
        let threshold_int = Self::scaled(threshold, accept_cap);
        // Padding and rejected entries cost more than any accepted entry
        let max_cost = threshold_int
            .saturating_add(1)
            .max(1)
            .saturating_mul(COST_SCALE as i64);
        let mut int_cost_matrix = Matrix::new(size, size, max_cost);

        let cost_data: Vec<(usize, usize, i64)> = (0..num_rows)
            .into_par_iter()
            .flat_map(|i| {
                (0..num_columns).into_par_iter().map(move |j| {
                    let cost = cost_matrix[[i, j]];
                    let scaled = if Self::is_valid(cost, threshold) {
                        Self::scaled(cost, threshold_int)
                    } else {
                        max_cost
                    };
                    (i, j, scaled)
                })
            })
            .collect();

        // Apply costs to matrix (sequential, as Matrix is not thread-safe for writes)
        for (i, j, cost) in cost_data {
            int_cost_matrix[(i, j)] = cost;
        }

        let (_, raw_assignments) = kuhn_munkres_min(&int_cost_matrix);

        let assignments: Vec<(usize, usize)> = raw_assignments
            .iter()
            .enumerate()
            .filter_map(|(row, &column)| {
                if row < num_rows
                    && column < num_columns
                    && Self::is_valid(cost_matrix[[row, column]], threshold)
                {
                    Some((row, column))
                } else {
                    None
                }
            })
            .collect();

        Self::finish(cost_matrix, assignments)
    }

    /// Greedy assignment algorithm for sparse cost matrices
    /// Much faster than Hungarian when most assignments are invalid
    fn solve_greedy(cost_matrix: ArrayView2<f32>, threshold: f32) -> AssignmentResult {
        let num_rows = cost_matrix.nrows();
        let num_columns = cost_matrix.ncols();

        let mut candidates: Vec<(f32, usize, usize)> = Vec::new();
        for i in 0..num_rows {
            for j in 0..num_columns {
                let cost = cost_matrix[[i, j]];
                if Self::is_valid(cost, threshold) {
                    candidates.push((cost, i, j));
                }
            }
        }

        // Sort by cost (ascending - best assignments first), ties by position
        candidates.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
                .then(a.2.cmp(&b.2))
        });

        let mut assignments = Vec::new();
        let mut used_rows = vec![false; num_rows];
        let mut used_columns = vec![false; num_columns];

        for (_cost, row, column) in candidates {
            if !used_rows[row] && !used_columns[column] {
                assignments.push((row, column));
                used_rows[row] = true;
                used_columns[column] = true;
            }
        }
        assignments.sort_unstable();

        Self::finish(cost_matrix, assignments)
    }

    fn finish(cost_matrix: ArrayView2<f32>, assignments: Vec<(usize, usize)>) -> AssignmentResult {
        let mut assigned_rows = vec![false; cost_matrix.nrows()];
        let mut assigned_columns = vec![false; cost_matrix.ncols()];
        for &(row, column) in &assignments {
            assigned_rows[row] = true;
            assigned_columns[column] = true;
        }

        let total_cost = assignments
            .iter()
            .map(|&(row, column)| Self::scaled(cost_matrix[[row, column]], i64::MAX / 4))
            .fold(0i64, i64::saturating_add);

        AssignmentResult {
            unassigned_rows: (0..assigned_rows.len())
                .filter(|&i| !assigned_rows[i])
                .collect(),
            unassigned_columns: (0..assigned_columns.len())
                .filter(|&i| !assigned_columns[i])
                .collect(),
            assignments,
            total_cost,
        }
    }
}

impl AssignmentResult {
    /// Column assigned to each row, `None` for unassigned rows
    pub fn row_assignments(&self, num_rows: usize) -> Vec<Option<usize>> {
        let mut assignment_vector = vec![None; num_rows];
        for &(row, column) in &self.assignments {
            if row < num_rows {
                assignment_vector[row] = Some(column);
            }
        }
        assignment_vector
    }
}
