//! Filesystem-safe names for column directories and value files.

use std::collections::HashSet;

use crate::spec::EnumNameCollisionStrategy;

/// Characters replaced by `_` in every derived path component.
pub const TUP_PATH_RESERVED: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
/// Replacement for names that sanitize to nothing.
pub const C_NAME_EMPTY: &str = "empty";

/// Derive a non-empty, filesystem-legal path component from `text`.
///
/// Reserved characters become `_`, whitespace runs collapse to one space and
/// the ends are trimmed. A name made only of dots (`.`, `..`) has every dot
/// replaced by `_`, so the component always names an entry inside its parent.
/// The result is idempotent under re-sanitization.
pub fn sanitize_path_component(text: &str) -> String {
    let c_replaced: String = text
        .chars()
        .map(|chr| {
            if TUP_PATH_RESERVED.contains(&chr) {
                '_'
            } else {
                chr
            }
        })
        .collect();
    let c_name = c_replaced.split_whitespace().collect::<Vec<_>>().join(" ");

    if c_name.is_empty() {
        C_NAME_EMPTY.to_string()
    } else if c_name.chars().all(|chr| chr == '.') {
        "_".repeat(c_name.len())
    } else {
        c_name
    }
}

/// Allocated path component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecAllocatedName {
    /// Final component.
    pub name: String,
    /// Whether a suffix was added to avoid a collision.
    pub if_renamed: bool,
}

/// Hands out names within one directory according to a collision strategy.
///
/// Collisions are detected case-insensitively so the outcome does not depend
/// on the filesystem.
#[derive(Debug, Clone)]
pub struct NameAllocator {
    rule_name_collision: EnumNameCollisionStrategy,
    set_names_taken: HashSet<String>,
}

impl NameAllocator {
    /// Empty allocator.
    pub fn new(rule_name_collision: EnumNameCollisionStrategy) -> Self {
        Self {
            rule_name_collision,
            set_names_taken: HashSet::new(),
        }
    }

    /// Reserve `name`, or the first free `name__<n>` (n >= 2) on collision.
    pub fn allocate(&mut self, name: &str) -> SpecAllocatedName {
        let if_taken = !self.set_names_taken.insert(name.to_lowercase());
        if !if_taken || self.rule_name_collision == EnumNameCollisionStrategy::Overwrite {
            return SpecAllocatedName {
                name: name.to_string(),
                if_renamed: false,
            };
        }

        let mut n_idx = 2usize;
        loop {
            let candidate = format!("{name}__{n_idx}");
            if self.set_names_taken.insert(candidate.to_lowercase()) {
                return SpecAllocatedName {
                    name: candidate,
                    if_renamed: true,
                };
            }
            n_idx += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_reserved_characters() {
        assert_eq!(sanitize_path_component("Sales/Region?"), "Sales_Region_");
        assert_eq!(sanitize_path_component(r#"a<b>c:d"e\f|g*h"#), "a_b_c_d_e_f_g_h");
    }

    #[test]
    fn test_sanitize_collapses_and_trims_whitespace() {
        assert_eq!(sanitize_path_component("  North \t  East\n"), "North East");
    }

    #[test]
    fn test_sanitize_empty_maps_to_placeholder() {
        assert_eq!(sanitize_path_component(""), "empty");
        assert_eq!(sanitize_path_component(" \t "), "empty");
        assert_eq!(sanitize_path_component("??"), "__");
    }

    #[test]
    fn test_sanitize_dot_only_names_stay_inside_parent() {
        assert_eq!(sanitize_path_component("."), "_");
        assert_eq!(sanitize_path_component(".."), "__");
        assert_eq!(sanitize_path_component("  ..  "), "__");
        assert_eq!(sanitize_path_component("..."), "___");
        assert_eq!(sanitize_path_component("../x"), ".._x");
        assert_eq!(sanitize_path_component("v1.2"), "v1.2");
    }

    #[test]
    fn test_sanitize_is_idempotent_and_never_empty() {
        let l_inputs = [
            "",
            " ",
            "Sales/Region?",
            "  a   b  ",
            "<>:\"/\\|?*",
            "ünïcödé  näme",
            "empty",
            "3.5",
            ".",
            "..",
            " . ",
            "\u{00a0}x\u{2003}y",
        ];
        for c_input in l_inputs {
            let c_once = sanitize_path_component(c_input);
            assert!(!c_once.is_empty(), "input {c_input:?}");
            assert_eq!(sanitize_path_component(&c_once), c_once, "input {c_input:?}");
        }
    }

    #[test]
    fn test_allocator_disambiguates_case_insensitively() {
        let mut allocator = NameAllocator::new(EnumNameCollisionStrategy::Disambiguate);

        assert_eq!(allocator.allocate("North").name, "North");
        let second = allocator.allocate("north");
        assert_eq!(second.name, "north__2");
        assert!(second.if_renamed);
        assert_eq!(allocator.allocate("North").name, "North__3");
        assert_eq!(allocator.allocate("South").name, "South");
    }

    #[test]
    fn test_allocator_overwrite_keeps_name() {
        let mut allocator = NameAllocator::new(EnumNameCollisionStrategy::Overwrite);

        assert_eq!(allocator.allocate("a_b").name, "a_b");
        let second = allocator.allocate("a_b");
        assert_eq!(second.name, "a_b");
        assert!(!second.if_renamed);
    }
}
