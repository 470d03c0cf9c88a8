//! Parser for the controller's system description (`system.ini`).
//!
//! The description is INI text:
//!
//! ```text
//! [GROUPS]
//! MovingLinear = GROUP3
//!
//! [GROUP3]
//! PositionerInUse = Pos
//!
//! [GROUP3.Pos]
//! PlugNumber = 3
//! StageName = ILS250CC
//! ```
//!
//! Keys are case-insensitive, `;` and `#` start comment lines. Only the data
//! the topology needs is extracted; limits are not part of the file.

use super::GroupCategory;
use crate::error::{FtsError, FtsResult};
use std::collections::HashMap;

/// Group entry as declared in the description.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupEntry {
    /// Group name
    pub name: String,
    /// Category from the `[GROUPS]` key
    pub category: GroupCategory,
    /// Full stage names (`GROUP.POSITIONER`), in declaration order
    pub positioners: Vec<String>,
}

/// Stage entry as declared in the description.
#[derive(Debug, Clone, PartialEq)]
pub struct StageEntry {
    /// Full stage name (`GROUP.POSITIONER`)
    pub name: String,
    /// Hardware stage type identifier
    pub stage_type: String,
}

/// Everything the topology needs from the description file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopologyDescription {
    /// Groups in `[GROUPS]` declaration order
    pub groups: Vec<GroupEntry>,
    /// Stages in file order
    pub stages: Vec<StageEntry>,
}

struct Section {
    name: String,
    entries: HashMap<String, String>,
    /// `[GROUPS]` keys keep their order and original spelling
    ordered: Vec<(String, String)>,
}

fn split_sections(lines: &[String]) -> FtsResult<Vec<Section>> {
    let mut sections: Vec<Section> = Vec::new();

    for (index, raw) in lines.iter().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }

        if let Some(header) = line.strip_prefix('[') {
            let name = header.strip_suffix(']').ok_or_else(|| {
                FtsError::Configuration(format!(
                    "system description line {}: unterminated section header",
                    index + 1
                ))
            })?;
            sections.push(Section {
                name: name.trim().to_string(),
                entries: HashMap::new(),
                ordered: Vec::new(),
            });
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| {
            FtsError::Configuration(format!(
                "system description line {}: expected 'key = value'",
                index + 1
            ))
        })?;
        let section = sections.last_mut().ok_or_else(|| {
            FtsError::Configuration(format!(
                "system description line {}: entry outside any section",
                index + 1
            ))
        })?;
        let key = key.trim();
        let value = value.trim().to_string();
        section.ordered.push((key.to_string(), value.clone()));
        section.entries.insert(key.to_ascii_lowercase(), value);
    }

    Ok(sections)
}

fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse the description text into groups and stages.
pub fn parse(lines: &[String]) -> FtsResult<TopologyDescription> {
    let sections = split_sections(lines)?;

    let groups_section = sections
        .iter()
        .find(|s| s.name.eq_ignore_ascii_case("GROUPS"))
        .ok_or_else(|| {
            FtsError::Configuration("system description has no [GROUPS] section".into())
        })?;

    let mut groups: Vec<GroupEntry> = Vec::new();
    for (key, value) in &groups_section.ordered {
        let category = GroupCategory::from_key(key);
        for name in split_list(value) {
            if groups.iter().any(|g| g.name == name) {
                return Err(FtsError::Configuration(format!(
                    "group '{name}' is declared more than once in [GROUPS]"
                )));
            }
            groups.push(GroupEntry {
                name,
                category: category.clone(),
                positioners: Vec::new(),
            });
        }
    }

    let mut stages = Vec::new();
    for section in &sections {
        if ["GROUPS", "GENERAL", "DEFAULT"]
            .iter()
            .any(|skip| section.name.eq_ignore_ascii_case(skip))
        {
            continue;
        }

        if let Some(group) = groups.iter_mut().find(|g| g.name == section.name) {
            let in_use = section.entries.get("positionerinuse").ok_or_else(|| {
                FtsError::Configuration(format!(
                    "group section [{}] has no PositionerInUse",
                    section.name
                ))
            })?;
            group.positioners = split_list(in_use)
                .map(|p| format!("{}.{}", section.name, p))
                .collect();
        } else if section.entries.contains_key("plugnumber") {
            let stage_type = section
                .entries
                .get("stagename")
                .cloned()
                .unwrap_or_default();
            stages.push(StageEntry {
                name: section.name.clone(),
                stage_type,
            });
        }
    }

    Ok(TopologyDescription { groups, stages })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    #[test]
    fn groups_keep_declaration_order_and_categories() {
        let desc = parse(&lines(
            "[GENERAL]\nBootScriptFileName =\n\
             [GROUPS]\nSingleAxisInUse = GROUP1, GROUP3\nPointingRotary = GROUP2\nXYInUse =\n\
             [GROUP1]\nPositionerInUse = Pos\n\
             [GROUP2]\nPositionerInUse = Pos\n\
             [GROUP3]\nPositionerInUse = Pos\n\
             [GROUP1.Pos]\nPlugNumber = 1\nStageName = ILS100CC\n\
             [GROUP2.Pos]\nPlugNumber = 2\nStageName = URS75BCC\n\
             [GROUP3.Pos]\nPlugNumber = 3\nStageName = ILS250CC\n",
        ))
        .unwrap();

        let names: Vec<_> = desc.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["GROUP1", "GROUP3", "GROUP2"]);
        assert_eq!(
            desc.groups[0].category,
            GroupCategory::Other("SingleAxisInUse".into())
        );
        assert_eq!(desc.groups[2].category, GroupCategory::PointingRotary);
        assert_eq!(desc.groups[1].positioners, vec!["GROUP3.Pos"]);

        assert_eq!(desc.stages.len(), 3);
        assert_eq!(desc.stages[1].name, "GROUP2.Pos");
        assert_eq!(desc.stages[1].stage_type, "URS75BCC");
    }

    #[test]
    fn keys_are_case_insensitive_and_comments_skipped() {
        let desc = parse(&lines(
            "; generated\n[GROUPS]\nMovingLinear = GROUP3\n\
             # scanning mirror\n[GROUP3]\npositionerinuse = Pos\n\
             [GROUP3.Pos]\nPLUGNUMBER = 3\nstagename = ILS250CC\n",
        ))
        .unwrap();
        assert_eq!(desc.groups[0].category, GroupCategory::MovingLinear);
        assert_eq!(desc.stages[0].stage_type, "ILS250CC");
    }

    #[test]
    fn missing_groups_section_is_a_configuration_error() {
        let err = parse(&lines("[GROUP1]\nPositionerInUse = Pos\n")).unwrap_err();
        assert!(matches!(err, FtsError::Configuration(_)));
    }

    #[test]
    fn duplicate_group_is_rejected() {
        let err = parse(&lines(
            "[GROUPS]\nPointingLinear = GROUP1\nMovingLinear = GROUP1\n",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("GROUP1"));
    }

    #[test]
    fn malformed_line_reports_position() {
        let err = parse(&lines("[GROUPS]\nMovingLinear GROUP3\n")).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
