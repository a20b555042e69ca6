//! Workflows bundled with the host.

use relay_core::workflow::WorkflowRegistry;

pub mod ask_name;
pub mod newsletter_signup;
pub mod process_files;
pub mod refund;
pub mod survey;

pub fn builtin_registry() -> WorkflowRegistry {
    WorkflowRegistry::new()
        .with(ask_name::definition())
        .with(newsletter_signup::definition())
        .with(process_files::definition())
        .with(refund::definition())
        .with(survey::definition())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_listed_by_title() {
        let titles: Vec<String> = builtin_registry()
            .list()
            .into_iter()
            .map(|meta| meta.title)
            .collect();
        assert_eq!(
            titles,
            vec![
                "Ask Name",
                "Newsletter Signup",
                "Process Files",
                "Process Refund",
                "Survey Demo"
            ]
        );
    }

    #[test]
    fn builtins_are_addressable_by_slug() {
        let registry = builtin_registry();
        for slug in [
            "ask-name",
            "newsletter-signup",
            "process-files",
            "process-refund",
            "survey-demo",
        ] {
            assert!(registry.get(slug).is_some(), "missing {slug}");
        }
    }
}
