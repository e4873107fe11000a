//! Built-in expectations for the Tenrankai marketing site

use crate::spec::{JsonKind, TestCase, TestSuite};

/// Marker served on the site root
pub const ROOT_MARKER: &str = "<h1>Tenrankai</h1>";

/// All built-in suites in run order
pub fn default_suites() -> Vec<TestSuite> {
    vec![
        main_pages(),
        documentation(),
        blog_posts(),
        static_files(),
        api_endpoints(),
        error_handling(),
    ]
}

pub fn main_pages() -> TestSuite {
    TestSuite::new(
        "Main Pages",
        vec![
            TestCase::new("/", "Homepage").content(ROOT_MARKER),
            TestCase::new("/features", "Features page").content("File-Based Architecture"),
            TestCase::new("/about", "About page").content("About Tenrankai"),
            TestCase::new("/contact", "Get Involved page").content("Get Involved"),
            TestCase::new("/gallery", "Gallery"),
            TestCase::new("/docs", "Documentation").content("Quick Start Guide"),
            TestCase::new("/blog", "Blog").content("Introducing Tenrankai"),
        ],
    )
}

pub fn documentation() -> TestSuite {
    TestSuite::new(
        "Documentation",
        vec![
            TestCase::new("/docs/00-quick-start", "Quick Start guide").content("5-Minute Setup"),
            TestCase::new("/docs/01-installation", "Installation guide")
                .content("Installation Guide"),
            TestCase::new("/docs/02-core-concepts", "Core Concepts guide")
                .content("Core Concepts"),
        ],
    )
}

pub fn blog_posts() -> TestSuite {
    TestSuite::new(
        "Blog Posts",
        vec![TestCase::new("/blog/introducing-tenrankai", "Blog post")
            .content("high-performance photo gallery")],
    )
}

pub fn static_files() -> TestSuite {
    TestSuite::new(
        "Static Files",
        vec![
            TestCase::new("/static/style.css", "Main CSS").content("font-family"),
            TestCase::new("/static/home.css", "Home CSS"),
            TestCase::new("/static/DejaVuSans.ttf", "Font file"),
            TestCase::new("/favicon.ico", "Favicon"),
            TestCase::new("/robots.txt", "Robots.txt"),
        ],
    )
}

pub fn api_endpoints() -> TestSuite {
    TestSuite::new(
        "API Endpoints",
        vec![
            TestCase::new("/api/gallery/main/preview", "Gallery API")
                .json_kind("images", JsonKind::Array),
            TestCase::new("/api/gallery/main/preview?count=6", "Gallery preview API")
                .json_kind("images", JsonKind::Array),
        ],
    )
}

pub fn error_handling() -> TestSuite {
    TestSuite::new(
        "Error Handling",
        vec![
            TestCase::new("/nonexistent", "404 page").status(404),
            TestCase::new("/gallery/nonexistent", "Gallery 404").status(404),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_suite_names_are_unique() {
        let suites = default_suites();
        let names: HashSet<_> = suites.iter().map(|s| s.name.clone()).collect();
        assert_eq!(names.len(), suites.len());
    }

    #[test]
    fn test_every_case_is_rooted() {
        for suite in default_suites() {
            assert!(!suite.cases.is_empty(), "{} is empty", suite.name);
            for case in &suite.cases {
                assert!(case.path.starts_with('/'), "{} is not rooted", case.path);
            }
        }
    }

    #[test]
    fn test_root_marker_and_error_statuses() {
        assert_eq!(main_pages().cases[0].expected_content.as_deref(), Some(ROOT_MARKER));
        assert!(error_handling().cases.iter().all(|c| c.expected_status == 404));
        assert!(api_endpoints().cases.iter().all(|c| c.expects_json()));
    }
}
