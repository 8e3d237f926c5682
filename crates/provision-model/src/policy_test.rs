#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crate::error::ModelError;
    use crate::policy::{Policy, PolicyTable, PolicyTemplate};

    fn table(entries: &[&str]) -> PolicyTable {
        PolicyTable {
            p_table: entries.iter().map(|s| (*s).to_string()).collect(),
            ..PolicyTable::default()
        }
    }

    fn existing(entries: &[&str]) -> HashSet<String> {
        entries.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_compact_dedups_keeping_first_and_prunes_dangling() {
        let mut t = table(&["p1", "p2", "gone", "p1", "p3", "p2"]);
        assert!(t.compact(&existing(&["p1", "p2", "p3"])));
        assert_eq!(t.p_table, vec!["p1", "p2", "p3"]);
        assert!(!t.compact(&existing(&["p1", "p2", "p3"])));
    }

    #[test]
    fn test_add_item_is_idempotent() {
        let mut t = PolicyTable::default();
        assert!(t.add_item("p1"));
        assert!(!t.add_item("p1"));
        assert_eq!(t.p_table.len(), 1);
        assert_eq!(t.uuid, "policy_table");
    }

    #[test]
    fn test_move_higher_lower_boundaries() {
        let mut t = table(&["a", "b", "c"]);
        assert!(!t.move_higher("a"));
        assert!(!t.move_lower("c"));
        assert!(t.move_higher("c"));
        assert_eq!(t.p_table, vec!["a", "c", "b"]);
        assert!(t.move_lower("a"));
        assert_eq!(t.p_table, vec!["c", "a", "b"]);
        assert!(!t.move_higher("missing"));
    }

    #[test]
    fn test_move_to_index() {
        let mut t = table(&["a", "b", "c", "d"]);
        assert!(t.move_to_index("d", 0).unwrap());
        assert_eq!(t.p_table, vec!["d", "a", "b", "c"]);
        assert!(t.move_to_index("d", 2).unwrap());
        assert_eq!(t.p_table, vec!["a", "b", "d", "c"]);
        assert!(!t.move_to_index("zz", 1).unwrap());
    }

    #[test]
    fn test_move_to_index_out_of_range() {
        let mut t = table(&["a", "b", "c"]);
        for bad in [-1, 3, 10] {
            match t.move_to_index("a", bad) {
                Err(ModelError::InputError(msg)) => assert_eq!(
                    msg,
                    format!("New line number '{bad}' is not valid; should be an between 0 and 2")
                ),
                other => panic!("expected input error, got {other:?}"),
            }
        }
        assert_eq!(t.p_table, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_policy_capacity_and_tags() {
        let mut p = Policy::new(
            "web",
            PolicyTemplate::LinuxDeploy,
            "m1",
            vec!["a".to_string(), "b".to_string()],
        );
        assert!(p.has_capacity());
        p.maximum = 2;
        p.bound_count = 2;
        assert!(!p.has_capacity());
        assert!(p.tags_satisfied_by(&["a".to_string(), "b".to_string(), "c".to_string()]));
        assert!(!p.tags_satisfied_by(&["a".to_string()]));
        assert!(!p.has_broker());
    }
}
