//! People the bot can recognise by plain name in a question.

use std::collections::BTreeMap;

use pmbot_backend::Assignee;

use crate::context_format::TurnData;

const MIN_NAME_CHARS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownMember {
    pub name: String,
    pub discord_id: Option<String>,
}

/// Names gathered from identity mappings and from assignees seen in fetched
/// data, keyed case-insensitively.
#[derive(Debug, Default)]
pub struct MemberRoster {
    members: BTreeMap<String, KnownMember>,
}

impl MemberRoster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Adds `name`, filling in a missing Discord id on an existing entry.
    pub fn learn(&mut self, name: &str, discord_id: Option<&str>) {
        let name = name.trim().trim_start_matches('@');
        if name.chars().count() < MIN_NAME_CHARS {
            return;
        }
        let discord_id = discord_id.map(str::trim).filter(|id| !id.is_empty());
        let entry = self
            .members
            .entry(name.to_lowercase())
            .or_insert_with(|| KnownMember {
                name: name.to_string(),
                discord_id: None,
            });
        if let Some(discord_id) = discord_id {
            entry.discord_id = Some(discord_id.to_string());
        }
    }

    pub fn learn_from_data(&mut self, data: &TurnData) {
        for stats in &data.member_stats {
            self.learn(&stats.username, stats.discord_id.as_deref());
        }
        for assignee in data.tasks.iter().filter_map(|task| task.assignee.as_ref()) {
            self.learn_assignee(assignee);
        }
    }

    fn learn_assignee(&mut self, assignee: &Assignee) {
        for name in [assignee.username.as_deref(), assignee.name.as_deref()]
            .into_iter()
            .flatten()
        {
            self.learn(name, assignee.discord_id.as_deref());
        }
    }

    pub fn members(&self) -> Vec<KnownMember> {
        self.members.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use pmbot_backend::{Assignee, MemberStats, Task};

    use super::{KnownMember, MemberRoster};
    use crate::context_format::TurnData;

    #[test]
    fn unit_learn_merges_case_insensitively_and_keeps_known_ids() {
        let mut roster = MemberRoster::default();
        roster.learn("Ravi", None);
        roster.learn("@ravi", Some("42"));
        roster.learn("ravi", None);
        roster.learn("x", Some("7"));

        assert_eq!(
            roster.members(),
            vec![KnownMember {
                name: "Ravi".to_string(),
                discord_id: Some("42".to_string()),
            }]
        );
    }

    #[test]
    fn functional_learn_from_data_reads_stats_and_assignees() {
        let mut roster = MemberRoster::default();
        roster.learn_from_data(&TurnData {
            member_stats: vec![MemberStats {
                username: "mei".to_string(),
                discord_id: Some("7".to_string()),
                completed: 2,
            }],
            tasks: vec![Task {
                id: None,
                title: "Fix login crash".to_string(),
                status: "todo".to_string(),
                priority: "HIGH".to_string(),
                project_id: None,
                project_name: None,
                due_date: None,
                assignee: Some(Assignee {
                    name: Some("John Park".to_string()),
                    username: Some("john".to_string()),
                    discord_id: Some("55".to_string()),
                }),
            }],
            ..TurnData::default()
        });

        let names = roster
            .members()
            .into_iter()
            .map(|member| member.name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["john", "John Park", "mei"]);
        assert_eq!(roster.len(), 3);
    }
}
