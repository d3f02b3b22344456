use fleetmon::config::{DEFAULT_REMOTE_PORT, parse_site_config};
use fleetmon::core::FleetMonError;
use fleetmon::core::status::record::{SiteOptions, SwitchMode};

#[test]
fn test_parse_full_site_line() {
    let sites = parse_site_config(
        "alpha  host-a.example:4450/host-b.example:4451  ssh  10  3600  600  257\n",
        5,
    )
    .unwrap();
    assert_eq!(sites.len(), 1);

    let site = &sites[0];
    assert_eq!(site.alias, "alpha");
    assert_eq!(site.endpoints[0].host, "host-a.example");
    assert_eq!(site.endpoints[0].port, 4450);
    assert_eq!(site.endpoints[1].host, "host-b.example");
    assert_eq!(site.endpoints[1].port, 4451);
    assert_eq!(site.command, "ssh");
    assert_eq!(site.poll_interval, 10);
    assert_eq!(site.connect_time, 3600);
    assert_eq!(site.disconnect_time, 600);
    assert!(site.options.contains(SiteOptions::TLS));
    assert_eq!(site.options.failover_mode(), SwitchMode::Auto);
}

#[test]
fn test_single_endpoint_is_used_for_both_toggles() {
    let sites = parse_site_config("solo host-a.example ssh\n", 5).unwrap();
    assert_eq!(sites[0].endpoints[0], sites[0].endpoints[1]);
    assert_eq!(sites[0].endpoints[0].port, DEFAULT_REMOTE_PORT);
}

#[test]
fn test_missing_numeric_fields_fall_back_to_defaults() {
    let sites = parse_site_config("short host-a.example ssh\n", 7).unwrap();
    assert_eq!(sites[0].poll_interval, 7);
    assert_eq!(sites[0].connect_time, 0);
    assert_eq!(sites[0].disconnect_time, 0);
    assert!(sites[0].options.is_empty());
}

#[test]
fn test_dash_command_marks_a_group_row() {
    let sites = parse_site_config("all - -\nalpha host-a.example ssh\n", 5).unwrap();
    assert!(sites[0].is_group());
    assert!(!sites[1].is_group());
}

#[test]
fn test_comments_and_blank_lines_are_skipped() {
    let text = "# fleet of march 2026\n\nalpha host-a.example ssh\n  # indented comment\n";
    let sites = parse_site_config(text, 5).unwrap();
    assert_eq!(sites.len(), 1);
}

#[test]
fn test_duplicate_alias_is_rejected_with_line_number() {
    let err = parse_site_config("a host-a ssh\na host-b ssh\n", 5).unwrap_err();
    assert!(matches!(
        err,
        FleetMonError::SiteConfigError { line: 2, .. }
    ));
}

#[test]
fn test_overlong_alias_is_rejected() {
    let err = parse_site_config("thisaliasiswaytoolong host-a ssh\n", 5).unwrap_err();
    assert!(matches!(err, FleetMonError::SiteConfigError { line: 1, .. }));
}

#[test]
fn test_bad_port_is_rejected() {
    let err = parse_site_config("a host-a.example:notaport ssh\n", 5).unwrap_err();
    assert!(matches!(err, FleetMonError::SiteConfigError { line: 1, .. }));
}
