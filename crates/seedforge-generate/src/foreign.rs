use rand::{Rng, RngCore};

use seedforge_core::Relationship;

use crate::errors::GenerationError;

/// Read-only snapshot of a parent table's primary keys: `first_pk..first_pk + count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentPool {
    pub first_pk: u64,
    pub count: u64,
}

/// Children per parent for one foreign key.
///
/// With `units`, exactly that many children are spread over the pool: every parent
/// first receives `min_children`, the remainder goes to random parents that are
/// still below `max_children`. Without `units`, each parent draws its own count in
/// `min_children..=max_children` and the total sizes the child table.
pub fn allocate(
    table: &str,
    rel: &Relationship,
    units: Option<u64>,
    pool: ParentPool,
    rng: &mut dyn RngCore,
) -> Result<Vec<u64>, GenerationError> {
    let parents = pool.count;
    if parents == 0 {
        return Err(capacity(
            table,
            format!("foreign key {} has no parent rows to reference", rel.label()),
            format!("give table '{}' at least one row", rel.parent_table),
        ));
    }
    let slots = usize::try_from(parents).map_err(|_| {
        capacity(
            table,
            format!("parent table '{}' is too large to allocate children", rel.parent_table),
            "lower the parent row_count",
        )
    })?;
    let (min, max) = (rel.min_children, rel.max_children);

    let Some(units) = units else {
        return Ok((0..slots).map(|_| rng.random_range(min..=max)).collect());
    };

    let floor = parents.saturating_mul(min);
    let ceiling = parents.saturating_mul(max);
    if units < floor {
        return Err(capacity(
            table,
            format!(
                "foreign key {} needs at least {floor} child rows for {parents} parent rows with min_children={min}, found {units}",
                rel.label()
            ),
            "raise the child row_count or lower min_children",
        ));
    }
    if units > ceiling {
        return Err(capacity(
            table,
            format!(
                "foreign key {} can hold at most {ceiling} child rows for {parents} parent rows with max_children={max}, found {units}",
                rel.label()
            ),
            "lower the child row_count or raise max_children",
        ));
    }

    let mut counts = vec![min; slots];
    let mut open: Vec<usize> = if max > min { (0..slots).collect() } else { Vec::new() };
    let mut remaining = units - floor;
    while remaining > 0 {
        if open.is_empty() {
            return Err(capacity(
                table,
                format!("foreign key {} ran out of child slots", rel.label()),
                "raise max_children",
            ));
        }
        let pick = rng.random_range(0..open.len());
        let parent = open[pick];
        counts[parent] += 1;
        if counts[parent] == max {
            open.swap_remove(pick);
        }
        remaining -= 1;
    }
    Ok(counts)
}

fn capacity(table: &str, issue: String, hint: impl Into<String>) -> GenerationError {
    GenerationError::Capacity {
        table: table.to_string(),
        business_key: None,
        attempted: 0,
        issue,
        hint: hint.into(),
    }
}

/// Parent keys of a child table's entities. Children are grouped by parent key order.
#[derive(Debug, Clone)]
pub struct ForeignAssignment {
    /// Index into `Project::relationships`.
    pub relationship: usize,
    /// Index of the child column.
    pub column: usize,
    pub pool: ParentPool,
    /// `ends[p]` is one past the last entity assigned to parent `p`.
    ends: Vec<u64>,
}

impl ForeignAssignment {
    pub fn new(relationship: usize, column: usize, pool: ParentPool, counts: &[u64]) -> Self {
        let mut total = 0_u64;
        let ends = counts
            .iter()
            .map(|count| {
                total += count;
                total
            })
            .collect();
        Self {
            relationship,
            column,
            pool,
            ends,
        }
    }

    pub fn entities(&self) -> u64 {
        self.ends.last().copied().unwrap_or(0)
    }

    /// Parent primary key of the 0-based `entity`.
    pub fn parent_pk(&self, entity: u64) -> u64 {
        let slot = self.ends.partition_point(|end| *end <= entity) as u64;
        self.pool.first_pk + slot
    }

    /// Entity ranges per parent, as `(parent_pk, start..end)`.
    pub fn groups(&self) -> impl Iterator<Item = (u64, std::ops::Range<u64>)> + '_ {
        self.ends.iter().enumerate().map(move |(slot, end)| {
            let start = if slot == 0 { 0 } else { self.ends[slot - 1] };
            (self.pool.first_pk + slot as u64, start..*end)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rel(min: u64, max: u64) -> Relationship {
        Relationship {
            child_table: "orders".to_string(),
            child_column: "customer_id".to_string(),
            parent_table: "customers".to_string(),
            parent_column: "id".to_string(),
            min_children: min,
            max_children: max,
        }
    }

    const POOL: ParentPool = ParentPool {
        first_pk: 1,
        count: 10,
    };

    #[test]
    fn fixed_total_respects_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let counts = allocate("orders", &rel(1, 3), Some(25), POOL, &mut rng).expect("feasible");
        assert_eq!(counts.len(), 10);
        assert_eq!(counts.iter().sum::<u64>(), 25);
        assert!(counts.iter().all(|count| (1..=3).contains(count)));
    }

    #[test]
    fn auto_total_draws_per_parent() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let counts = allocate("orders", &rel(2, 4), None, POOL, &mut rng).expect("feasible");
        assert!(counts.iter().all(|count| (2..=4).contains(count)));
    }

    #[test]
    fn infeasible_totals_are_capacity_errors() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let err = allocate("orders", &rel(1, 3), Some(31), POOL, &mut rng).expect_err("too many");
        assert_eq!(
            err.to_string(),
            "Table 'orders': foreign key orders.customer_id -> customers.id can hold at most 30 child rows for 10 parent rows with max_children=3, found 31. Fix: lower the child row_count or raise max_children."
        );
        let err = allocate("orders", &rel(2, 3), Some(19), POOL, &mut rng).expect_err("too few");
        assert!(err.to_string().contains("needs at least 20 child rows"));
    }

    #[test]
    fn entities_are_grouped_by_parent_order() {
        let assignment = ForeignAssignment::new(0, 1, POOL, &[2, 1, 3, 0, 0, 0, 0, 0, 0, 4]);
        let parents: Vec<u64> = (0..10).map(|entity| assignment.parent_pk(entity)).collect();
        assert_eq!(parents, vec![1, 1, 2, 3, 3, 3, 10, 10, 10, 10]);
        assert_eq!(assignment.entities(), 10);
        assert_eq!(assignment.groups().nth(2), Some((3, 3..6)));
    }
}
