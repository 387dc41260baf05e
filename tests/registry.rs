//! Registry Integration Tests
//!
//! Routine definitions from YAML: wave layout and validation errors.

use daybreak::config::{ConfigFile, ResolvedConfig, Runtime};
use daybreak::core::{RegistryError, StepDescriptor, StepRegistry};

#[test]
fn test_canonical_routine_waves() {
    let registry = StepRegistry::canonical().unwrap();

    assert_eq!(
        registry.wave_names(),
        vec![
            vec!["alarm", "news_fetch", "calendar", "tasks", "music"],
            vec!["summarize"],
        ]
    );
    assert_eq!(
        registry.get("summarize").unwrap().input_from.as_deref(),
        Some("news_fetch")
    );
}

#[test]
fn test_custom_routine_from_yaml() {
    let yaml = r#"
- name: alarm
  adapter: alarm
- name: news_fetch
  adapter: news_fetch
  input: weather
  depends_on: [alarm]
  timeout_ms: 1500
- name: summarize
  adapter: summarize
  depends_on: [news_fetch]
  input_from: news_fetch
- name: music
  adapter: music
  depends_on: [alarm]
  enabled: false
"#;
    let steps: Vec<StepDescriptor> = serde_yaml::from_str(yaml).unwrap();
    let registry = StepRegistry::new(steps).unwrap();

    assert_eq!(
        registry.wave_names(),
        vec![vec!["alarm"], vec!["news_fetch", "music"], vec!["summarize"]]
    );
    let news = registry.get("news_fetch").unwrap();
    assert_eq!(registry.timeout_for(news).as_millis(), 1500);
    assert!(!registry.get("music").unwrap().enabled);
}

#[test]
fn test_cycle_is_a_configuration_error() {
    let file = ConfigFile::from_yaml(
        r#"
schedule:
  at: "07:00"
steps:
  - { name: alarm, adapter: alarm, depends_on: [music] }
  - { name: news_fetch, adapter: news_fetch, depends_on: [alarm] }
  - { name: music, adapter: music, depends_on: [news_fetch] }
"#,
    )
    .unwrap();
    let config = ResolvedConfig::from_file(file, None).unwrap();

    match config.registry() {
        Err(RegistryError::Cycle { steps }) => {
            assert_eq!(steps, vec!["alarm", "news_fetch", "music"]);
        }
        other => panic!("expected cycle error, got {:?}", other.map(|r| r.len())),
    }
    assert!(Runtime::build(config).is_err());
}

#[test]
fn test_empty_routine_is_rejected() {
    assert_eq!(StepRegistry::new(Vec::new()).unwrap_err(), RegistryError::Empty);
}
