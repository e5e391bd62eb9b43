use super::*;

#[test]
fn subcommands_parse_in_kebab_case() {
    let cli = Cli::try_parse_from(["churn-cli", "--base-url", "http://h/api", "top-risk"]).unwrap();
    assert_eq!(cli.base_url.as_deref(), Some("http://h/api"));
    assert_eq!(cli.state_dir, None);
    assert!(matches!(cli.command, Command::TopRisk));
}

#[test]
fn register_role_defaults_to_user() {
    let cli = Cli::try_parse_from([
        "churn-cli", "register", "--email", "a@b.c", "--password", "password123", "--full-name", "Ana",
    ])
    .unwrap();
    let Command::Register(args) = cli.command else {
        panic!("expected register");
    };
    assert_eq!(args.into_request().role, Role::User);
}

#[test]
fn users_create_accepts_admin_role() {
    let cli = Cli::try_parse_from([
        "churn-cli", "users", "create", "--email", "a@b.c", "--password", "password123", "--full-name", "Ana",
        "--role", "admin",
    ])
    .unwrap();
    let Command::Users(UsersCommand { command: UsersSubcommand::Create(args) }) = cli.command else {
        panic!("expected users create");
    };
    assert_eq!(args.into_request().role, Role::Admin);
}

#[test]
fn request_collects_repeated_headers() {
    let cli = Cli::try_parse_from([
        "churn-cli", "request", "/churn/stats", "-X", "post", "-H", "X-A: 1", "-H", "X-B: 2",
    ])
    .unwrap();
    let Command::Request(args) = cli.command else {
        panic!("expected request");
    };
    assert_eq!(args.path, "/churn/stats");
    assert_eq!(args.headers, vec!["X-A: 1", "X-B: 2"]);
    assert_eq!(parse_method(&args.method).unwrap(), reqwest::Method::POST);
}

#[test]
fn invalid_method_is_rejected() {
    assert!(matches!(parse_method("GE T"), Err(CliError::InvalidMethod(_))));
}

#[test]
fn split_header_trims_both_sides() {
    assert_eq!(split_header(" Accept :  text/plain ").unwrap(), ("Accept".to_owned(), "text/plain".to_owned()));
    assert!(matches!(split_header("no-colon"), Err(CliError::InvalidHeader(_))));
    assert!(matches!(split_header(": value"), Err(CliError::InvalidHeader(_))));
}

#[test]
fn predict_overrides_apply_on_top_of_defaults() {
    let args = PredictArgs {
        tenure: Some(24),
        monthly_charges: Some(80.5),
        contract: Some("Two year".into()),
        ..PredictArgs::default()
    };
    let features = load_features(&args).unwrap();
    assert_eq!(features.tenure, 24);
    assert!((features.monthly_charges - 80.5).abs() < f64::EPSILON);
    assert_eq!(features.contract, "Two year");
    assert_eq!(features.payment_method, ChurnFeatures::default().payment_method);
}

#[test]
fn missing_predict_input_reports_the_path() {
    let args = PredictArgs { input: Some(PathBuf::from("/nonexistent/customer.json")), ..PredictArgs::default() };
    let err = load_features(&args).unwrap_err();
    assert!(err.to_string().contains("/nonexistent/customer.json"));
}

#[test]
fn client_errors_display_their_user_message() {
    let err = CliError::from(ClientError::from(TransportError::Request("refused".into())));
    assert_eq!(err.to_string(), churn_alert::error::CONNECTION_ERROR_MESSAGE);
}

#[test]
fn flags_override_environment_config() {
    let config = resolve_config(Some("http://flag.test/api/".into()), Some(PathBuf::from("/tmp/churn-state")));
    assert_eq!(config.api_url, "http://flag.test/api");
    assert_eq!(config.state_dir, PathBuf::from("/tmp/churn-state"));
}

#[test]
fn error_codes_pass_through_client_codes() {
    assert_eq!(CliError::from(ClientError::InvalidCredentials).code(), "E_INVALID_CREDENTIALS");
    assert_eq!(CliError::from(ClientError::api(400, "bad")).code(), "E_VALIDATION");
    assert_eq!(CliError::NotSignedIn.code(), "E_NOT_SIGNED_IN");
    assert_eq!(CliError::InvalidHeader("x".into()).code(), "E_USAGE");
}
