//! Groups raw shape points by shape identifier before insertion.

use crate::import::records::ShapeRecord;
use std::collections::HashMap;

/// All points of one shape, ordered by sequence number.
#[derive(Debug)]
pub struct ShapeGroup {
    pub shape_id: String,
    pub points: Vec<ShapeRecord>,
}

/// Group points by shape natural key, keeping groups in first-seen order.
///
/// Points within a group are sorted by ascending sequence number so the
/// stored order matches the read-back contract no matter how the file
/// interleaved them. Points lacking a sequence sort last and surface as a
/// constraint violation at insert time.
pub fn group_by_shape(rows: Vec<ShapeRecord>) -> Vec<ShapeGroup> {
    let mut groups: Vec<ShapeGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        match index.get(&row.shape_id) {
            Some(&i) => groups[i].points.push(row),
            None => {
                index.insert(row.shape_id.clone(), groups.len());
                groups.push(ShapeGroup {
                    shape_id: row.shape_id.clone(),
                    points: vec![row],
                });
            }
        }
    }

    for group in &mut groups {
        group
            .points
            .sort_by_key(|p| p.shape_pt_sequence.unwrap_or(i32::MAX));
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(shape_id: &str, sequence: i32) -> ShapeRecord {
        ShapeRecord {
            shape_id: shape_id.to_string(),
            shape_pt_lat: Some(1.0),
            shape_pt_lon: Some(2.0),
            shape_pt_sequence: Some(sequence),
            shape_dist_traveled: None,
        }
    }

    #[test]
    fn groups_keep_first_seen_order() {
        let groups = group_by_shape(vec![point("B", 1), point("A", 1), point("B", 2)]);

        let ids: Vec<&str> = groups.iter().map(|g| g.shape_id.as_str()).collect();
        assert_eq!(ids, vec!["B", "A"]);
        assert_eq!(groups[0].points.len(), 2);
    }

    #[test]
    fn points_sort_by_sequence_regardless_of_file_order() {
        let groups = group_by_shape(vec![point("X", 3), point("X", 1), point("X", 2)]);

        let sequences: Vec<i32> = groups[0]
            .points
            .iter()
            .filter_map(|p| p.shape_pt_sequence)
            .collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }
}
