//! Page locations and selector lists for the X web client.
//!
//! These are coupled to the current markup of a third-party UI and are the
//! first thing to check when a step starts failing.

/// Entry point of the login flow.
pub const LOGIN_URL: &str = "https://x.com/i/flow/login";
/// Authenticated home timeline.
pub const HOME_URL: &str = "https://x.com/home";
/// Standalone composer used for threads.
pub const COMPOSE_URL: &str = "https://x.com/compose/post";
/// Base for profile and status URLs.
pub const BASE_URL: &str = "https://x.com";

pub const USERNAME_FIELDS: &[&str] = &[
    r#"input[name="text"]"#,
    r#"input[autocomplete="username"]"#,
];

pub const PASSWORD_FIELD: &str = r#"input[name="password"]"#;

pub const PASSWORD_ALTERNATIVES: &[&str] = &[
    "[data-testid='password']",
    "input[type='password']",
    "input[autocomplete='current-password']",
];

pub const VERIFICATION_FIELDS: &[&str] = &[
    r#"input[data-testid="ocfEnterTextTextInput"]"#,
    r#"input[name="text"]"#,
    r#"input[placeholder*="code"]"#,
    r#"input[type="text"]"#,
];

pub const NEXT_LABELS: &[&str] = &["Next", "İleri"];
pub const LOGIN_LABELS: &[&str] = &["Log in", "Login", "Giriş"];
pub const VERIFY_LABELS: &[&str] = &["Next", "Verify", "İleri", "Doğrula"];

/// Markers that only exist once the user is logged in, in order of preference.
pub const LOGGED_IN_MARKERS: &[&str] = &[
    r#"[data-testid="AppTabBar_Home_Link"]"#,
    r#"div[aria-label="Home timeline"]"#,
    r#"div[data-testid="primaryColumn"]"#,
];

/// Fragments of a URL that belong to the login flow.
pub const LOGIN_FLOW_PATHS: &[&str] = &["login", "i/flow"];

/// Fragment of a URL that identifies the home view.
pub const HOME_PATH: &str = "home";

/// Words on the page that suggest a confirmation-code prompt.
pub const VERIFICATION_KEYWORDS: &[&str] = &["verification", "confirm", "code", "verify"];

pub const COMPOSE_BUTTONS: &[&str] = &[
    r#"a[href="/compose/post"]"#,
    r#"a[href="/compose/tweet"]"#,
    r#"a[data-testid="SideNav_NewTweet_Button"]"#,
    r#"a[aria-label="Post"]"#,
    r#"a[aria-label="Tweet"]"#,
    r#"[data-testid="FloatingActionButton_Tweet"]"#,
];

pub const COMPOSE_LABELS: &[&str] = &["Post", "Tweet"];

pub const TEXT_SURFACES: &[&str] = &[
    r#"div[role="textbox"][data-testid="tweetTextarea_0"]"#,
    r#"div[contenteditable="true"][data-testid="tweetTextarea_0"]"#,
    r#"div[role="textbox"]"#,
    r#"div[contenteditable="true"]"#,
];

pub const SUBMIT_BUTTONS: &[&str] = &[
    r#"div[data-testid="tweetButtonInline"]"#,
    r#"[data-testid="tweetButton"]"#,
];

pub const SUBMIT_LABELS: &[&str] = &["Post", "Tweet"];

/// Submit control of the standalone composer used for threads.
pub const THREAD_SUBMIT: &[&str] = &[r#"[data-testid="tweetButton"]"#];

pub const ADD_POST_BUTTONS: &[&str] = &[
    r#"[data-testid="addButton"]"#,
    r#"div[aria-label="Add"]"#,
    r#"div[aria-label="Add post"]"#,
];

pub const REPLY_BUTTONS: &[&str] = &[r#"[data-testid="reply"]"#, r#"div[aria-label="Reply"]"#];

pub const REPLY_SUBMIT_LABELS: &[&str] = &["Reply", "Post"];

pub const POST_ARTICLES: &[&str] = &[
    r#"article[data-testid="tweet"]"#,
    r#"[data-testid="tweet"]"#,
    r#"article[role="article"]"#,
];

pub const STATUS_LINK: &str = r#"a[href*="/status/"]"#;

/// Text area of the `index`-th post in the composer.
pub fn thread_textarea(index: usize) -> String {
    format!(r#"[data-testid="tweetTextarea_{}"]"#, index)
}
