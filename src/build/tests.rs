use super::*;
use crate::output::OutputMode;
use std::collections::BTreeMap;
use std::path::Path;
use tempfile::TempDir;

struct Site {
    dir: TempDir,
    config: SiteConfig,
}

impl Site {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("content")).unwrap();
        let mut config = SiteConfig::default().with_root(dir.path());
        config.site.insert("name".into(), "Test Site".into());
        Self { dir, config }
    }

    fn write(&self, rel: &str, body: &str) {
        let path = self.dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.dir.path().join("dist").join(rel)).unwrap()
    }

    fn build(&self) -> Result<BuildReport> {
        build(&self.config, &Self::options())
    }

    fn options() -> BuildOptions {
        BuildOptions {
            workers: Some(4),
            quiet: true,
            ..BuildOptions::default()
        }
    }

    /// Every file under the output directory with its bytes.
    fn snapshot(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        let output = self.dir.path().join("dist");
        crate::utils::walk::collect_files(&output)
            .unwrap()
            .into_iter()
            .map(|path| {
                let bytes = fs::read(&path).unwrap();
                (path.strip_prefix(&output).unwrap().to_path_buf(), bytes)
            })
            .collect()
    }
}

#[test]
fn test_layout_wraps_markdown() {
    let site = Site::new();
    site.write("content/_layout.html", "<html>{{.Content}}</html>");
    site.write("content/a.md", "# Hi");

    let report = site.build().unwrap();
    assert_eq!(report.stats.rendered, 1);
    assert_eq!(site.read("a.html"), "<html><h1>Hi</h1>\n</html>");
    assert!(!site.dir.path().join("dist/_layout.html").exists());

    let cache: BTreeMap<String, String> = serde_json::from_str(&site.read(CACHE_FILE)).unwrap();
    assert!(cache.contains_key("content/a.md"));

    let second = site.build().unwrap();
    assert_eq!(second.selected, 0);
    assert_eq!(second.stats.processed(), 0);
}

#[test]
fn test_default_layout_uses_site_values() {
    let site = Site::new();
    site.write("content/index.md", "hi");
    site.build().unwrap();

    let html = site.read("index.html");
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("<title>Test Site</title>"));
    assert!(html.contains("<p>hi</p>"));
}

#[test]
fn test_nested_layouts() {
    let site = Site::new();
    site.write("content/_layout.html", "<html>{{ .Content }}</html>");
    site.write("content/blog/_layout.html", "<article>{{ .Page.title }}: {{ .Content }}</article>");
    site.write("content/blog/post.md", "---\ntitle: First\n---\nText");

    site.build().unwrap();
    assert_eq!(
        site.read("blog/post.html"),
        "<html><article>First: <p>Text</p>\n</article></html>"
    );
}

#[test]
fn test_idempotent() {
    let site = Site::new();
    site.write("content/_layout.html", "<main>{{ .Content }}</main>");
    site.write("content/a.md", "# A");
    site.write("content/docs/b.html", "<p>b</p>");
    site.write("content/img/c.svg", "<svg/>");
    site.write("public/robots.txt", "User-agent: *");

    let first = site.build().unwrap();
    assert_eq!(first.selected, 4);
    let output = site.snapshot();
    let cache = site.read(CACHE_FILE);

    let second = site.build().unwrap();
    assert_eq!(second.selected, 0);
    assert_eq!(second.stats.processed(), 0);
    assert_eq!(second.public, 0);
    assert_eq!(site.snapshot(), output);
    assert_eq!(site.read(CACHE_FILE), cache);
}

#[test]
fn test_cache_keys_are_project_relative() {
    let site = Site::new();
    site.write("content/a.md", "a");
    site.build().unwrap();

    let cache: BTreeMap<String, String> = serde_json::from_str(&site.read(CACHE_FILE)).unwrap();
    let fingerprint = &cache["content/a.md"];
    assert_eq!(fingerprint.len(), 64);
    assert!(fingerprint.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn test_incremental() {
    let site = Site::new();
    for name in ["a", "b", "c"] {
        site.write(&format!("content/{name}.md"), name);
    }
    site.build().unwrap();
    let before = site.snapshot();

    site.write("content/b.md", "b changed");
    let report = site.build().unwrap();
    assert_eq!(report.selected, 1);
    assert_eq!(report.stats.rendered, 1);

    let after = site.snapshot();
    assert_eq!(after[Path::new("a.html")], before[Path::new("a.html")]);
    assert_eq!(after[Path::new("c.html")], before[Path::new("c.html")]);
    assert!(site.read("b.html").contains("b changed"));
}

#[test]
fn test_partial_fanout() {
    let site = Site::new();
    site.write("partials/header.html", "<header>v1</header>");
    site.write("content/a.md", "{{ partial \"header.html\" }}\n\nA");
    site.write("content/b.html", "{{ partial \"header.html\" }}<p>B</p>");
    site.write("content/c.md", "C");
    site.build().unwrap();
    assert!(site.read("a.html").contains("<header>v1</header>"));
    let c_before = site.read("c.html");

    site.write("partials/header.html", "<header>v2</header>");
    let report = site.build().unwrap();
    assert_eq!(report.stats.rendered, 2);
    assert!(site.read("a.html").contains("<header>v2</header>"));
    assert!(site.read("b.html").contains("<header>v2</header>"));
    assert_eq!(site.read("c.html"), c_before);
}

#[test]
fn test_partial_in_layout_rebuilds_pages() {
    let site = Site::new();
    site.write("partials/nav.html", "<nav>v1</nav>");
    site.write("content/_layout.html", r#"<html>{{ partial "nav.html" }}{{ .Content }}</html>"#);
    site.write("content/a.md", "A");
    site.build().unwrap();
    assert_eq!(site.read("a.html"), "<html><nav>v1</nav><p>A</p>\n</html>");

    site.write("partials/nav.html", "<nav>v2</nav>");
    let report = site.build().unwrap();
    assert_eq!(report.stats.rendered, 1);
    assert_eq!(site.read("a.html"), "<html><nav>v2</nav><p>A</p>\n</html>");
}

#[test]
fn test_template_syntax_in_content_is_verbatim() {
    let site = Site::new();
    site.write("content/_layout.html", "{{ .Content }}");
    site.write("content/a.md", "Use `{{ range .Pages }}` to loop.");
    site.write("content/b.md", "Write `{{ .Site.name }}` in a layout.");

    site.build().unwrap();
    assert_eq!(
        site.read("a.html"),
        "<p>Use <code>{{ range .Pages }}</code> to loop.</p>\n"
    );
    assert_eq!(
        site.read("b.html"),
        "<p>Write <code>{{ .Site.name }}</code> in a layout.</p>\n"
    );
}

#[test]
fn test_changed_layout_rebuilds_its_subtree() {
    let site = Site::new();
    site.write("content/top.md", "top");
    site.write("content/blog/_layout.html", "<b>{{ .Content }}</b>");
    site.write("content/blog/post.md", "post");
    site.build().unwrap();

    site.write("content/blog/_layout.html", "<i>{{ .Content }}</i>");
    let report = site.build().unwrap();
    assert_eq!(report.stats.rendered, 1);
    assert_eq!(site.read("blog/post.html"), "<i><p>post</p>\n</i>");
}

#[test]
fn test_failure_reports_first_error_and_leaves_no_temp_files() {
    let site = Site::new();
    for i in 0..100 {
        site.write(&format!("content/p{i:03}.md"), &format!("page {i}"));
    }
    site.write("content/p050.md", "---\ntitle: [unclosed\n---\nbroken");

    let err = site.build().unwrap_err();
    assert!(matches!(err, BuildError::Parse { .. }), "{err}");
    assert!(err.to_string().contains("p050.md"));

    for (path, bytes) in site.snapshot() {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(!name.ends_with(".tmp"), "leftover {name}");
        if name != CACHE_FILE {
            assert!(String::from_utf8(bytes).unwrap().contains("</html>"));
        }
    }
    assert!(!site.dir.path().join("dist/p050.html").exists());

    // Fixing the file makes it the only one left to build
    site.write("content/p050.md", "fixed");
    let report = site.build().unwrap();
    assert!(report.selected >= 1);
    assert!(site.read("p050.html").contains("fixed"));
}

#[test]
fn test_canceled_build() {
    let site = Site::new();
    site.write("content/a.md", "a");
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = build_with_cancel(&site.config, &Site::options(), &cancel).unwrap_err();
    assert!(matches!(err, BuildError::Canceled));
    assert!(!site.dir.path().join("dist/a.html").exists());
}

#[test]
fn test_zero_workers_rejected() {
    let site = Site::new();
    let options = BuildOptions {
        workers: Some(0),
        ..Site::options()
    };
    let err = build(&site.config, &options).unwrap_err();
    assert!(matches!(err, BuildError::Config(_)));
}

#[test]
fn test_corrupt_cache_needs_clean() {
    let site = Site::new();
    site.write("content/a.md", "a");
    site.write("dist/.cache", "{ not json");

    let err = site.build().unwrap_err();
    assert!(matches!(err, BuildError::Cache { .. }));
    assert!(err.to_string().contains("--clean"));

    let options = BuildOptions {
        clean: true,
        ..Site::options()
    };
    let report = build(&site.config, &options).unwrap();
    assert_eq!(report.stats.rendered, 1);
}

#[test]
fn test_clean_rebuilds_everything() {
    let site = Site::new();
    site.write("content/a.md", "a");
    site.write("content/b.md", "b");
    site.build().unwrap();

    let options = BuildOptions {
        clean: true,
        ..Site::options()
    };
    let report = build(&site.config, &options).unwrap();
    assert_eq!(report.selected, 2);
    assert_eq!(report.stats.unchanged, 2);
}

#[test]
fn test_output_override() {
    let site = Site::new();
    site.write("content/a.md", "a");
    let options = BuildOptions {
        output: Some("site-out".into()),
        ..Site::options()
    };
    build(&site.config, &options).unwrap();
    assert!(site.dir.path().join("site-out/a.html").is_file());
    assert!(site.dir.path().join("site-out").join(CACHE_FILE).is_file());
}

#[test]
fn test_missing_content_dir() {
    let site = Site::new();
    fs::remove_dir(site.dir.path().join("content")).unwrap();
    let report = site.build().unwrap();
    assert_eq!(report.tracked, 0);
    assert_eq!(report.stats, ScheduleStats::default());
}

#[test]
fn test_merge_mode_matches_fresh_render() {
    let mut site = Site::new();
    site.config.build.output_mode = OutputMode::Merge;
    site.write("content/_layout.html", "<html>\n<body>\n{{ .Content }}</body>\n</html>\n");
    site.write("content/a.md", "one\n\ntwo");
    site.build().unwrap();

    site.write("content/a.md", "one\n\nthree");
    site.build().unwrap();
    assert_eq!(
        site.read("a.html"),
        "<html>\n<body>\n<p>one</p>\n<p>three</p>\n</body>\n</html>\n"
    );
}
