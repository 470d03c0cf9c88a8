//! Topology Model
//!
//! Static description of the motion groups and stages of the instrument.
//! Built once per session from the controller's system description plus live
//! limit queries, read-only afterwards. A reload builds a fresh [`Topology`]
//! and swaps the shared `Arc`, so a partially updated topology is never
//! observable.

pub mod system_ini;

use crate::config::TopologyConfig;
use crate::error::{FtsError, FtsResult};
use crate::hardware::capabilities::{ConfigTransport, MotionLink};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

pub use system_ini::{GroupEntry, StageEntry, TopologyDescription};

/// Instrument role of a motion group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupCategory {
    /// Linear stage of the pointing mirror
    PointingLinear,
    /// Rotary stage of the pointing mirror
    PointingRotary,
    /// Scanning stage carrying the moving mirror
    MovingLinear,
    /// Any other `[GROUPS]` key, kept verbatim
    Other(String),
}

impl GroupCategory {
    /// Category for a `[GROUPS]` key (case-insensitive).
    pub fn from_key(key: &str) -> Self {
        match key.to_ascii_lowercase().as_str() {
            "pointinglinear" => GroupCategory::PointingLinear,
            "pointingrotary" => GroupCategory::PointingRotary,
            "movinglinear" => GroupCategory::MovingLinear,
            _ => GroupCategory::Other(key.to_string()),
        }
    }
}

impl fmt::Display for GroupCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupCategory::PointingLinear => write!(f, "PointingLinear"),
            GroupCategory::PointingRotary => write!(f, "PointingRotary"),
            GroupCategory::MovingLinear => write!(f, "MovingLinear"),
            GroupCategory::Other(key) => write!(f, "{key}"),
        }
    }
}

/// A named set of stages moved as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionGroup {
    /// Group name (`GROUP3`)
    pub name: String,
    /// Instrument role
    pub category: GroupCategory,
    /// Full stage names, in controller axis order
    pub positioners: Vec<String>,
}

impl MotionGroup {
    /// First positioner of the group; single-axis groups have only this one.
    pub fn primary_positioner(&self) -> &str {
        // Non-empty by Topology::new.
        self.positioners.first().map(String::as_str).unwrap_or_default()
    }
}

/// Travel and dynamics limits of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageLimits {
    /// Lowest allowed target
    pub min_target: f64,
    /// Highest allowed target
    pub max_target: f64,
    /// Maximum velocity
    pub max_velocity: f64,
    /// Maximum acceleration
    pub max_acceleration: f64,
}

/// A stage with its type and limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// Full stage name (`GROUP.POSITIONER`)
    pub name: String,
    /// Hardware stage type identifier
    pub stage_type: String,
    /// Limits read from the controller
    pub limits: StageLimits,
}

/// Groups and stages of one controller session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Topology {
    groups: Vec<MotionGroup>,
    stages: HashMap<String, Stage>,
}

impl Topology {
    /// Build a topology, checking that every positioner of every group is a
    /// known stage and that group names are unique.
    pub fn new(groups: Vec<MotionGroup>, stages: Vec<Stage>) -> FtsResult<Self> {
        let stages: HashMap<String, Stage> =
            stages.into_iter().map(|s| (s.name.clone(), s)).collect();

        for (i, group) in groups.iter().enumerate() {
            if groups[..i].iter().any(|g| g.name == group.name) {
                return Err(FtsError::Configuration(format!(
                    "duplicate group '{}'",
                    group.name
                )));
            }
            if group.positioners.is_empty() {
                return Err(FtsError::Configuration(format!(
                    "group '{}' has no positioners",
                    group.name
                )));
            }
            if let Some(missing) = group.positioners.iter().find(|p| !stages.contains_key(*p)) {
                return Err(FtsError::Configuration(format!(
                    "group '{}' uses unknown stage '{missing}'",
                    group.name
                )));
            }
        }

        Ok(Self { groups, stages })
    }

    /// Load the topology of a controller.
    ///
    /// Reads the description through `transport`, applies the configured role
    /// overrides and queries every stage's limits through `link`.
    pub async fn load(
        transport: &dyn ConfigTransport,
        link: &dyn MotionLink,
        config: &TopologyConfig,
    ) -> FtsResult<Self> {
        let lines = transport.fetch_text(&config.description_path).await?;
        let mut description = system_ini::parse(&lines)?;
        apply_roles(&mut description, config)?;

        let mut stages = Vec::with_capacity(description.stages.len());
        for entry in description.stages {
            let (max_velocity, max_acceleration) = link
                .positioner_max_velocity_acceleration(&entry.name)
                .await
                .map_err(|f| {
                    FtsError::hardware(&entry.name, "PositionerMaximumVelocityAndAccelerationGet", f)
                })?;
            let (min_target, max_target) = link
                .positioner_user_travel_limits(&entry.name)
                .await
                .map_err(|f| FtsError::hardware(&entry.name, "PositionerUserTravelLimitsGet", f))?;

            debug!(
                stage = %entry.name,
                min_target, max_target, max_velocity, max_acceleration,
                "stage limits"
            );
            stages.push(Stage {
                name: entry.name,
                stage_type: entry.stage_type,
                limits: StageLimits {
                    min_target,
                    max_target,
                    max_velocity,
                    max_acceleration,
                },
            });
        }

        let groups = description
            .groups
            .into_iter()
            .map(|g| MotionGroup {
                name: g.name,
                category: g.category,
                positioners: g.positioners,
            })
            .collect();

        let topology = Self::new(groups, stages)?;
        info!(
            groups = topology.groups.len(),
            stages = topology.stages.len(),
            "topology loaded"
        );
        Ok(topology)
    }

    /// Look up a group by name.
    pub fn lookup_group(&self, name: &str) -> FtsResult<&MotionGroup> {
        self.groups
            .iter()
            .find(|g| g.name == name)
            .ok_or_else(|| FtsError::Configuration(format!("unknown group '{name}'")))
    }

    /// Look up a stage by full name.
    pub fn lookup_stage(&self, name: &str) -> FtsResult<&Stage> {
        self.stages
            .get(name)
            .ok_or_else(|| FtsError::Configuration(format!("unknown stage '{name}'")))
    }

    /// Limits of a stage.
    pub fn lookup_stage_limits(&self, name: &str) -> FtsResult<&StageLimits> {
        self.lookup_stage(name).map(|s| &s.limits)
    }

    /// The single group carrying `category`.
    pub fn group_for(&self, category: &GroupCategory) -> FtsResult<&MotionGroup> {
        let mut matching = self.groups.iter().filter(|g| &g.category == category);
        match (matching.next(), matching.next()) {
            (Some(group), None) => Ok(group),
            (None, _) => Err(FtsError::Configuration(format!(
                "no {category} group in topology"
            ))),
            (Some(a), Some(b)) => Err(FtsError::Configuration(format!(
                "ambiguous {category} role: '{}' and '{}'",
                a.name, b.name
            ))),
        }
    }

    /// Groups in description order.
    pub fn groups(&self) -> &[MotionGroup] {
        &self.groups
    }

    /// All stages, in no particular order.
    pub fn stages(&self) -> impl Iterator<Item = &Stage> {
        self.stages.values()
    }
}

/// Assign configured roles to groups, overriding description categories.
fn apply_roles(description: &mut TopologyDescription, config: &TopologyConfig) -> FtsResult<()> {
    let roles = [
        (&config.roles.pointing_linear, GroupCategory::PointingLinear),
        (&config.roles.pointing_rotary, GroupCategory::PointingRotary),
        (&config.roles.moving_linear, GroupCategory::MovingLinear),
    ];

    for (assigned, category) in roles {
        let Some(name) = assigned else { continue };
        if !description.groups.iter().any(|g| &g.name == name) {
            return Err(FtsError::Configuration(format!(
                "{category} role names unknown group '{name}'"
            )));
        }
        for group in &mut description.groups {
            if &group.name == name {
                group.category = category.clone();
            } else if group.category == category {
                group.category = GroupCategory::Other(format!("{category} (overridden)"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoleAssignments;
    use crate::hardware::mock::{MockMotionLink, MockTransport};

    fn limits(min: f64, max: f64) -> StageLimits {
        StageLimits {
            min_target: min,
            max_target: max,
            max_velocity: 20.0,
            max_acceleration: 80.0,
        }
    }

    fn stage(name: &str) -> Stage {
        Stage {
            name: name.into(),
            stage_type: "ILS250CC".into(),
            limits: limits(0.0, 100.0),
        }
    }

    #[test]
    fn group_with_unknown_stage_is_rejected() {
        let groups = vec![MotionGroup {
            name: "GROUP3".into(),
            category: GroupCategory::MovingLinear,
            positioners: vec!["GROUP3.Pos".into()],
        }];
        let err = Topology::new(groups, vec![stage("GROUP1.Pos")]).unwrap_err();
        assert!(err.to_string().contains("GROUP3.Pos"));
    }

    #[test]
    fn lookups_report_missing_names() {
        let topology = Topology::new(vec![], vec![stage("GROUP1.Pos")]).unwrap();
        assert!(topology.lookup_stage_limits("GROUP1.Pos").is_ok());
        assert!(matches!(
            topology.lookup_group("GROUP9"),
            Err(FtsError::Configuration(_))
        ));
        assert!(topology.lookup_stage_limits("GROUP9.Pos").is_err());
        assert!(topology.group_for(&GroupCategory::MovingLinear).is_err());
    }

    #[tokio::test]
    async fn load_reads_description_and_live_limits() {
        let transport = MockTransport::with_sample_description();
        let link = MockMotionLink::fts_default();

        let topology = Topology::load(&transport, &link, &TopologyConfig::default())
            .await
            .unwrap();

        let scanner = topology.group_for(&GroupCategory::MovingLinear).unwrap();
        assert_eq!(scanner.name, "GROUP3");
        let limits = topology
            .lookup_stage_limits(scanner.primary_positioner())
            .unwrap();
        assert!(limits.min_target < limits.max_target);
        assert_eq!(topology.groups().len(), 3);
    }

    #[tokio::test]
    async fn roles_override_description_categories() {
        let transport = MockTransport::new();
        transport
            .put_text(
                "Config/system.ini",
                "[GROUPS]\nSingleAxisInUse = GROUP1, GROUP2, GROUP3\n\
                 [GROUP1]\nPositionerInUse = Pos\n[GROUP2]\nPositionerInUse = Pos\n\
                 [GROUP3]\nPositionerInUse = Pos\n\
                 [GROUP1.Pos]\nPlugNumber = 1\nStageName = ILS100CC\n\
                 [GROUP2.Pos]\nPlugNumber = 2\nStageName = URS75BCC\n\
                 [GROUP3.Pos]\nPlugNumber = 3\nStageName = ILS250CC\n",
            )
            .await;
        let link = MockMotionLink::fts_default();
        let config = TopologyConfig {
            roles: RoleAssignments {
                pointing_linear: Some("GROUP1".into()),
                pointing_rotary: Some("GROUP2".into()),
                moving_linear: Some("GROUP3".into()),
            },
            ..TopologyConfig::default()
        };

        let topology = Topology::load(&transport, &link, &config).await.unwrap();
        assert_eq!(
            topology.group_for(&GroupCategory::PointingRotary).unwrap().name,
            "GROUP2"
        );
        assert_eq!(
            topology.group_for(&GroupCategory::MovingLinear).unwrap().name,
            "GROUP3"
        );
    }

    #[tokio::test]
    async fn role_for_unknown_group_is_rejected() {
        let transport = MockTransport::with_sample_description();
        let link = MockMotionLink::fts_default();
        let config = TopologyConfig {
            roles: RoleAssignments {
                moving_linear: Some("GROUP9".into()),
                ..RoleAssignments::default()
            },
            ..TopologyConfig::default()
        };
        let err = Topology::load(&transport, &link, &config).await.unwrap_err();
        assert!(matches!(err, FtsError::Configuration(_)));
    }

    #[tokio::test]
    async fn unreachable_transport_is_a_transport_error() {
        let transport = MockTransport::with_sample_description();
        transport.set_unreachable(true);
        let link = MockMotionLink::fts_default();
        let err = Topology::load(&transport, &link, &TopologyConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FtsError::Transport(_)));
    }
}
