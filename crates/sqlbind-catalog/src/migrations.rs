//! Migration file handling

/// Markers that start the rollback half of a migration file
const ROLLBACK_MARKERS: [&str; 4] = [
    "-- +goose down",
    "-- +migrate down",
    "---- create above / drop below ----",
    "-- migrate:down",
];

/// Drop everything from the first rollback marker on
///
/// Migration tools keep the "up" and "down" halves in one file; only the up
/// half describes the schema.
pub fn remove_rollback_statements(contents: &str) -> String {
    let mut lines = Vec::new();
    for line in contents.lines() {
        let marker = line.trim().to_lowercase();
        if ROLLBACK_MARKERS.iter().any(|m| marker.starts_with(m)) {
            break;
        }
        lines.push(line);
    }

    let mut kept = lines.join("\n");
    if contents.ends_with('\n') && !kept.is_empty() {
        kept.push('\n');
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn goose_down_is_removed() {
        let input = "-- +goose Up\nCREATE TABLE foo (id int);\n-- +goose Down\nDROP TABLE foo;\n";
        assert_eq!(
            remove_rollback_statements(input),
            "-- +goose Up\nCREATE TABLE foo (id int);\n"
        );
    }

    #[test]
    fn other_tools_are_recognised() {
        for marker in [
            "-- +migrate Down",
            "---- create above / drop below ----",
            "-- migrate:down",
        ] {
            let input = format!("CREATE TABLE foo (id int);\n{}\nDROP TABLE foo;", marker);
            assert_eq!(remove_rollback_statements(&input), "CREATE TABLE foo (id int);");
        }
    }

    #[test]
    fn files_without_markers_are_unchanged() {
        let input = "CREATE TABLE foo (id int);\nCREATE INDEX foo_id ON foo (id);\n";
        assert_eq!(remove_rollback_statements(input), input);
    }
}
