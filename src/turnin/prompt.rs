//! Table-driven prompt detection for the interactive session.
//!
//! The workstation login and the submission tool are built for humans, so
//! prompts are recognized by case-insensitive substring match on freshly read,
//! already-cleaned output. Each rule maps a pattern to the reply the driver
//! sends. Adding a new prompt type means adding a row, not touching the
//! driving loop.
//!
//! Matching is heuristic. A pattern may fire on output that was not really a
//! prompt, or miss a prompt phrased differently; the damage is bounded by the
//! driver's reply caps and its idle timeout.

/// Which part of the session a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Nested login from the gateway to the workstation.
    Hop,
    /// The submission command is running.
    Submit,
}

/// What to send back when a rule fires. A line terminator is always appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The user's secret.
    Secret,
    /// A fixed answer such as `y`.
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRule {
    pub stage: Stage,
    /// Lowercase substring to look for.
    pub pattern: String,
    pub reply: Reply,
}

impl PromptRule {
    pub fn new(stage: Stage, pattern: &str, reply: Reply) -> Self {
        Self {
            stage,
            pattern: pattern.to_lowercase(),
            reply,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PromptTable {
    rules: Vec<PromptRule>,
}

impl PromptTable {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Password prompts while hopping, confirmation questions from turnin.
    pub fn standard() -> Self {
        Self::empty()
            .with_rule(PromptRule::new(Stage::Hop, "password:", Reply::Secret))
            .with_rule(PromptRule::new(Stage::Hop, "permission denied", Reply::Secret))
            .with_rule(PromptRule::new(
                Stage::Submit,
                "do you want",
                Reply::Text("y".to_string()),
            ))
            .with_rule(PromptRule::new(
                Stage::Submit,
                "please enter",
                Reply::Text("y".to_string()),
            ))
    }

    pub fn with_rule(mut self, rule: PromptRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// First rule of `stage` whose pattern occurs in `fresh`.
    pub fn detect(&self, stage: Stage, fresh: &str) -> Option<&PromptRule> {
        if fresh.is_empty() {
            return None;
        }
        let fresh_lower = fresh.to_lowercase();
        self.rules
            .iter()
            .filter(|rule| rule.stage == stage)
            .find(|rule| fresh_lower.contains(&rule.pattern))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for PromptTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Whether cleaned output ends with a shell prompt character.
pub fn ends_with_shell_prompt(fresh: &str) -> bool {
    matches!(fresh.trim_end().chars().last(), Some('$') | Some('#'))
}

#[cfg(test)]
mod tests {
    use super::*;

    mod detect {
        use super::*;

        #[test]
        fn test_password_prompt_any_case() {
            let table = PromptTable::standard();
            let rule = table.detect(Stage::Hop, "alice@wsC's Password: ").unwrap();
            assert_eq!(rule.reply, Reply::Secret);
        }

        #[test]
        fn test_permission_denied_reinjects_secret() {
            let table = PromptTable::standard();
            let rule = table
                .detect(Stage::Hop, "Permission denied, please try again.\n")
                .unwrap();
            assert_eq!(rule.reply, Reply::Secret);
        }

        #[test]
        fn test_confirmation_cues() {
            let table = PromptTable::standard();
            let rule = table
                .detect(Stage::Submit, "main.c already submitted. Do you want to overwrite? ")
                .unwrap();
            assert_eq!(rule.reply, Reply::Text("y".to_string()));
            assert!(table.detect(Stage::Submit, "Please enter y or n: ").is_some());
        }

        #[test]
        fn test_rules_are_stage_scoped() {
            let table = PromptTable::standard();
            assert!(table.detect(Stage::Submit, "Password: ").is_none());
            assert!(table.detect(Stage::Hop, "Do you want to continue?").is_none());
        }

        #[test]
        fn test_no_match_on_empty_or_plain_output() {
            let table = PromptTable::standard();
            assert!(table.detect(Stage::Hop, "").is_none());
            assert!(table.detect(Stage::Submit, "Your files have been submitted.").is_none());
        }

        #[test]
        fn test_custom_rule_is_lowercased() {
            let table = PromptTable::empty().with_rule(PromptRule::new(
                Stage::Submit,
                "Continue [Y/N]",
                Reply::Text("Y".to_string()),
            ));
            assert_eq!(table.len(), 1);
            assert!(table.detect(Stage::Submit, "CONTINUE [y/n]?").is_some());
        }

        #[test]
        fn test_first_matching_rule_wins() {
            let table = PromptTable::standard();
            let rule = table
                .detect(Stage::Hop, "Permission denied.\nPassword:")
                .unwrap();
            assert_eq!(rule.pattern, "password:");
        }
    }

    mod shell_prompt {
        use super::*;

        #[test]
        fn test_dollar_and_hash() {
            assert!(ends_with_shell_prompt("user@host$ "));
            assert!(ends_with_shell_prompt("[root@ws ~]#"));
            assert!(ends_with_shell_prompt("last login...\nuser@ws:~$\n"));
        }

        #[test]
        fn test_not_a_prompt() {
            assert!(!ends_with_shell_prompt("costs $5 today"));
            assert!(!ends_with_shell_prompt("Password: "));
            assert!(!ends_with_shell_prompt(""));
        }
    }
}
