//! End-to-end packaging tests
//!
//! Each test lays out a small source tree in a temporary directory, runs the
//! jar maker over a manifest and inspects what ended up in the output root.

use filetime::FileTime;
use jarmaker::{JarError, JarMaker, JarMakerOptions, OutputFormat};
use pretty_assertions::assert_eq;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::ZipArchive;

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    fn write(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    fn options(&self, format: OutputFormat) -> JarMakerOptions {
        JarMakerOptions {
            top_source_dir: self.path("top"),
            source_dirs: vec![self.path("src")],
            ..JarMakerOptions::new(format)
        }
    }

    fn run(
        &self,
        options: JarMakerOptions,
        manifest: &str,
    ) -> Result<jarmaker::PackageStats, JarError> {
        let manifest_path = self.write("src/jar.mn", manifest);
        let mut maker = JarMaker::new(options)?;
        maker.make_jar_from_path(&manifest_path, &self.path("out"))
    }

    fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path(rel)).unwrap()
    }
}

fn jar_entries(path: &Path) -> Vec<(String, Vec<u8>)> {
    let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut entries: Vec<(String, Vec<u8>)> = (0..archive.len())
        .map(|i| {
            let mut entry = archive.by_index(i).unwrap();
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            (entry.name().to_string(), content)
        })
        .collect();
    entries.sort();
    entries
}

#[test]
fn test_flat_simple_entry() {
    let fx = Fixture::new();
    fx.write("src/bar.js", "X");

    let stats = fx
        .run(
            fx.options(OutputFormat::Flat),
            "foo.jar:\n  content/foo/bar.js (bar.js)\n",
        )
        .unwrap();

    assert_eq!(stats.copied, 1);
    assert_eq!(fx.read("out/chrome/foo/content/foo/bar.js"), "X");
    // No registration lines, no manifests.
    assert!(!fx.path("out/chrome.manifest").exists());
    assert!(!fx.path("out/chrome/foo.manifest").exists());
}

#[test]
fn test_flat_registration_without_base() {
    let fx = Fixture::new();
    fx.write("src/bar.js", "X");

    fx.run(
        fx.options(OutputFormat::Flat),
        "foo.jar:\n% content foo %content/foo/\n  content/foo/bar.js (bar.js)\n",
    )
    .unwrap();

    assert_eq!(fx.read("out/chrome.manifest"), "manifest chrome/foo.manifest\n");
    assert_eq!(fx.read("out/chrome/foo.manifest"), "content foo foo/content/foo/\n");
}

#[test]
fn test_jar_with_chrome_manifest_only() {
    let fx = Fixture::new();
    fx.write("src/main.js", "main");

    let mut options = fx.options(OutputFormat::Jar);
    options.use_chrome_manifest = true;
    options.use_jarfile_manifest = false;
    fx.run(
        options,
        "[app] foo.jar:\n% content foo %content/foo/\n  content/foo/main.js (main.js)\n",
    )
    .unwrap();

    assert_eq!(
        jar_entries(&fx.path("out/app/foo.jar")),
        vec![("content/foo/main.js".to_string(), b"main".to_vec())]
    );
    assert_eq!(
        fx.read("out/app/chrome.manifest"),
        "content foo jar:foo.jar!/content/foo/\n"
    );
    assert!(!fx.path("out/app/foo.manifest").exists());
}

#[test]
fn test_locale_entry_falls_back_to_en_us() {
    let fx = Fixture::new();
    fx.write("top/browser/en-US/foo.ftl", "hello = Hello");

    let mut options = fx.options(OutputFormat::Flat);
    options.relativesrcdir = Some("browser/locales".to_string());
    let maker = JarMaker::new(options.clone()).unwrap();
    assert_eq!(maker.locale_dirs(), &[fx.path("top/browser/en-US")]);

    fx.run(
        options,
        "[app] foo.jar:\n  locale/browser/foo.ftl (%foo.ftl)\n",
    )
    .unwrap();

    assert_eq!(fx.read("out/app/foo/locale/browser/foo.ftl"), "hello = Hello");
}

#[test]
fn test_fluent_files_skip_en_us_when_localizing() {
    let fx = Fixture::new();
    fx.write("top/browser/en-US/foo.ftl", "hello = Hello");
    fx.write("top/browser/en-US/foo.dtd", "<!ENTITY a \"A\">");
    fs::create_dir_all(fx.path("l10n/de/browser")).unwrap();
    fs::create_dir_all(fx.path("merge/de/browser")).unwrap();

    let mut options = fx.options(OutputFormat::Flat);
    options.relativesrcdir = Some("browser/locales".to_string());
    options.l10n_base = Some(fx.path("l10n/de"));
    options.l10n_merge = Some(fx.path("merge/de"));

    // Non-Fluent files still fall back.
    fx.run(options.clone(), "[app] foo.jar:\n  locale/browser/foo.dtd (%foo.dtd)\n")
        .unwrap();
    assert_eq!(fx.read("out/app/foo/locale/browser/foo.dtd"), "<!ENTITY a \"A\">");

    let err = fx
        .run(options, "[app] foo.jar:\n  locale/browser/foo.ftl (%foo.ftl)\n")
        .unwrap_err();
    match err {
        JarError::SourceNotFound { roots, .. } => {
            assert_eq!(roots, vec![fx.path("merge/de/browser"), fx.path("l10n/de/browser")]);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_explicit_locale_dirs() {
    let fx = Fixture::new();
    fx.write("l10n-a/a.properties", "a=first");
    fx.write("l10n-b/a.properties", "a=second");
    fx.write("l10n-b/b.properties", "b=second");

    let mut options = fx.options(OutputFormat::Flat);
    options.locale_dirs = Some(vec![fx.path("l10n-a"), fx.path("l10n-b")]);
    fx.run(
        options,
        "[app] foo.jar:\n  locale/a.properties (%a.properties)\n  locale/b.properties (%b.properties)\n",
    )
    .unwrap();

    assert_eq!(fx.read("out/app/foo/locale/a.properties"), "a=first");
    assert_eq!(fx.read("out/app/foo/locale/b.properties"), "b=second");
}

#[test]
fn test_plus_prefix_writes_nothing() {
    let fx = Fixture::new();
    fx.write("src/x.js", "x");

    let err = fx
        .run(
            fx.options(OutputFormat::Flat),
            "foo.jar:\n  content/a.js (x.js)\n+ content/x.js\n",
        )
        .unwrap_err();

    assert!(matches!(err, JarError::DeprecatedPrefix { line_number: 3, .. }));
    assert_eq!(err.kind(), "ManifestSyntaxError");
    assert!(!fx.path("out").exists());
}

#[test]
fn test_preprocessed_css_uses_percent_marker() {
    let fx = Fixture::new();
    fx.write("src/theme.css", "%define COLOR red\ncolor: %COLOR;\n#id { color: blue; }\n");

    let stats = fx
        .run(fx.options(OutputFormat::Flat), "theme.jar:\n* skin/classic/theme.css\n")
        .unwrap();

    assert_eq!(stats.preprocessed, 1);
    assert_eq!(
        fx.read("out/chrome/theme/skin/classic/theme.css"),
        "color: red;\n#id { color: blue; }\n"
    );
}

#[test]
fn test_preprocessed_entry_without_directives_fails() {
    let fx = Fixture::new();
    fx.write("src/plain.js", "let a = 1;\n");

    let err = fx
        .run(fx.options(OutputFormat::Flat), "[app] foo.jar:\n* content/plain.js\n")
        .unwrap_err();
    assert_eq!(err.kind(), "PreprocessorError");
}

#[test]
fn test_preprocessed_entry_sees_defines() {
    let fx = Fixture::new();
    fx.write(
        "src/about.xhtml",
        "#filter substitution\n<title>@MOZ_APP_DISPLAYNAME@</title>\n#ifdef NIGHTLY_BUILD\n<nightly/>\n#endif\n",
    );

    let mut options = fx.options(OutputFormat::Jar);
    options
        .defines
        .insert("MOZ_APP_DISPLAYNAME".to_string(), "Firefox".to_string());
    fx.run(options, "[app] foo.jar:\n* content/about.xhtml\n").unwrap();

    assert_eq!(
        jar_entries(&fx.path("out/app/foo.jar")),
        vec![(
            "content/about.xhtml".to_string(),
            b"<title>Firefox</title>\n".to_vec()
        )]
    );
}

#[test]
fn test_duplicate_output_is_fatal() {
    let fx = Fixture::new();
    fx.write("src/a.js", "a");
    fx.write("src/b.js", "b");

    let err = fx
        .run(
            fx.options(OutputFormat::Flat),
            "[app] foo.jar:\n  content/x.js (a.js)\n  content/x.js (b.js)\n",
        )
        .unwrap_err();

    match err {
        JarError::DuplicateOutput { ref output } => assert_eq!(output, "content/x.js"),
        ref other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.kind(), "DuplicateOutputError");
    assert_eq!(fx.read("out/app/foo/content/x.js"), "a");
}

#[test]
fn test_same_path_in_different_jars_is_allowed() {
    let fx = Fixture::new();
    fx.write("src/a.js", "a");

    fx.run(
        fx.options(OutputFormat::Flat),
        "[app] one.jar:\n  content/a.js\n[app] two.jar:\n  content/a.js\n",
    )
    .unwrap();

    assert_eq!(fx.read("out/app/one/content/a.js"), "a");
    assert_eq!(fx.read("out/app/two/content/a.js"), "a");
}

#[test]
fn test_sibling_sections_share_the_jar() {
    let fx = Fixture::new();
    fx.write("src/a.js", "a");
    fx.write("top/browser/en-US/b.dtd", "b");

    fx.run(
        fx.options(OutputFormat::Jar),
        "[app] foo.jar:\n  content/a.js\nrelativesrcdir browser/locales:\n  locale/b.dtd (%b.dtd)\n",
    )
    .unwrap();

    assert_eq!(
        jar_entries(&fx.path("out/app/foo.jar")),
        vec![
            ("content/a.js".to_string(), b"a".to_vec()),
            ("locale/b.dtd".to_string(), b"b".to_vec()),
        ]
    );
}

#[test]
fn test_sibling_sections_cannot_overlap() {
    let fx = Fixture::new();
    fx.write("src/a.js", "a");
    fx.write("top/browser/en-US/a.js", "localized");

    let err = fx
        .run(
            fx.options(OutputFormat::Jar),
            "[app] foo.jar:\n  content/a.js\nrelativesrcdir browser/locales:\n  content/a.js (%a.js)\n",
        )
        .unwrap_err();
    assert_eq!(err.kind(), "DuplicateOutputError");
}

#[test]
fn test_wildcards_first_root_wins() {
    let fx = Fixture::new();
    fx.write("src/icons/a.png", "a1");
    fx.write("src/icons/b.png", "b1");
    fx.write("src/icons/.hidden.png", "hidden");
    fx.write("src/icons/notes.txt", "txt");
    fx.write("src2/icons/b.png", "b2");
    fx.write("src2/icons/c.png", "c2");

    let mut options = fx.options(OutputFormat::Flat);
    options.source_dirs.push(fx.path("src2"));
    let stats = fx
        .run(options, "[app] foo.jar:\n  skin/icons (icons/*.png)\n")
        .unwrap();

    assert_eq!(stats.copied, 3);
    assert_eq!(fx.read("out/app/foo/skin/icons/a.png"), "a1");
    assert_eq!(fx.read("out/app/foo/skin/icons/b.png"), "b1");
    assert_eq!(fx.read("out/app/foo/skin/icons/c.png"), "c2");
    assert!(!fx.path("out/app/foo/skin/icons/.hidden.png").exists());
    assert!(!fx.path("out/app/foo/skin/icons/notes.txt").exists());
}

#[test]
fn test_recursive_anchored_wildcard() {
    let fx = Fixture::new();
    fx.write("top/toolkit/res/a/one.css", "1");
    fx.write("top/toolkit/res/a/b/two.css", "2");

    fx.run(
        fx.options(OutputFormat::Jar),
        "[app] foo.jar:\n  res/ (/toolkit/res/**/*.css)\n",
    )
    .unwrap();

    assert_eq!(
        jar_entries(&fx.path("out/app/foo.jar")),
        vec![
            ("res/a/b/two.css".to_string(), b"2".to_vec()),
            ("res/a/one.css".to_string(), b"1".to_vec()),
        ]
    );
}

#[test]
fn test_wildcard_without_matches_is_not_an_error() {
    let fx = Fixture::new();
    fs::create_dir_all(fx.path("src/icons")).unwrap();

    let stats = fx
        .run(fx.options(OutputFormat::Flat), "[app] foo.jar:\n  skin/ (icons/*.svg)\n")
        .unwrap();
    assert_eq!(stats.writes(), 0);
}

#[test]
fn test_empty_and_comment_only_manifests() {
    let fx = Fixture::new();
    for manifest in ["", "# nothing here\n\n   \n"] {
        let stats = fx.run(fx.options(OutputFormat::Jar), manifest).unwrap();
        assert_eq!(stats.jars, 0);
    }
    assert!(!fx.path("out").exists());
}

#[test]
fn test_flat_rerun_writes_nothing() {
    let fx = Fixture::new();
    let source = fx.write("src/a.js", "a");
    fx.write("src/theme.css", "%define C red\nc: %C;\n");
    let old = FileTime::from_unix_time(1_600_000_000, 0);
    filetime::set_file_mtime(&source, old).unwrap();

    let manifest = "[app] foo.jar:\n% content foo %content/\n  content/a.js\n* skin/theme.css\n";
    let first = fx.run(fx.options(OutputFormat::Flat), manifest).unwrap();
    assert_eq!(first.writes(), 2);
    let before = fx.read("out/app/foo/content/a.js");

    let second = fx.run(fx.options(OutputFormat::Flat), manifest).unwrap();
    assert_eq!(second.writes(), 0);
    assert_eq!(second.up_to_date, 2);
    assert_eq!(fx.read("out/app/foo/content/a.js"), before);
    assert_eq!(fx.read("out/app/foo.manifest"), "content foo foo/content/\n");

    // A newer source is copied again.
    let new = FileTime::from_unix_time(4_000_000_000, 0);
    fs::write(&source, "changed").unwrap();
    filetime::set_file_mtime(&source, new).unwrap();
    let third = fx.run(fx.options(OutputFormat::Flat), manifest).unwrap();
    assert_eq!(third.copied, 1);
    assert_eq!(fx.read("out/app/foo/content/a.js"), "changed");
}

#[test]
fn test_jar_rerun_writes_nothing_and_replaces_changed_entries() {
    let fx = Fixture::new();
    let a = fx.write("src/a.js", "a");
    fx.write("src/b.js", "b");
    let manifest = "[app] foo.jar:\n  content/a.js\n  content/b.js\n";

    let first = fx.run(fx.options(OutputFormat::Jar), manifest).unwrap();
    assert_eq!(first.copied, 2);
    let bytes = fs::read(fx.path("out/app/foo.jar")).unwrap();

    let second = fx.run(fx.options(OutputFormat::Jar), manifest).unwrap();
    assert_eq!(second.writes(), 0);
    assert_eq!(fs::read(fx.path("out/app/foo.jar")).unwrap(), bytes);

    fs::write(&a, "a2").unwrap();
    filetime::set_file_mtime(&a, FileTime::from_unix_time(4_000_000_000, 0)).unwrap();
    let third = fx.run(fx.options(OutputFormat::Jar), manifest).unwrap();
    assert_eq!(third.copied, 1);
    assert_eq!(
        jar_entries(&fx.path("out/app/foo.jar")),
        vec![
            ("content/a.js".to_string(), b"a2".to_vec()),
            ("content/b.js".to_string(), b"b".to_vec()),
        ]
    );
}

#[cfg(unix)]
#[test]
fn test_symlink_output() {
    let fx = Fixture::new();
    let source = fx.write("src/a.js", "a");
    fx.write("src/pp.js", "#define X 1\nvar x;\n");

    let manifest = "[app] foo.jar:\n  content/a.js\n* content/pp.js\n";
    let first = fx.run(fx.options(OutputFormat::Symlink), manifest).unwrap();
    assert_eq!(first.linked, 1);
    assert_eq!(first.preprocessed, 1);

    let link = fx.path("out/app/foo/content/a.js");
    assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    assert_eq!(fs::read_link(&link).unwrap(), source);
    assert!(!fs::symlink_metadata(fx.path("out/app/foo/content/pp.js"))
        .unwrap()
        .file_type()
        .is_symlink());

    let second = fx.run(fx.options(OutputFormat::Symlink), manifest).unwrap();
    assert_eq!(second.writes(), 0);
}

#[test]
fn test_root_manifest_entry() {
    let fx = Fixture::new();
    fx.write("src/a.js", "a");

    let mut options = fx.options(OutputFormat::Jar);
    options.root_manifest_app_id = Some("{appid}".to_string());
    fx.run(
        options,
        "[dist/bin/chrome] browser.jar:\n% content browser %content/browser/\n  content/browser/a.js (a.js)\n",
    )
    .unwrap();

    assert_eq!(
        fx.read("out/dist/bin/chrome/browser.manifest"),
        "content browser jar:browser.jar!/content/browser/\n"
    );
    assert_eq!(
        fx.read("out/dist/bin/chrome/chrome.manifest"),
        "manifest browser.manifest\n"
    );
    assert_eq!(
        fx.read("out/dist/bin/chrome.manifest"),
        "manifest chrome/chrome.manifest application={appid}\n"
    );
}

#[test]
fn test_deps_file_lists_inputs_and_outputs() {
    let fx = Fixture::new();
    fx.write("src/a.js", "a");

    let mut options = fx.options(OutputFormat::Jar);
    options.deps_file = Some(fx.path("out/foo.jar.pp"));
    fx.run(options, "[app] foo.jar:\n  content/a.js\n").unwrap();

    let deps = fx.read("out/foo.jar.pp");
    let rule = deps.lines().next().unwrap();
    let (targets, prerequisites) = rule.split_once(':').unwrap();
    assert!(targets.ends_with("out/app/foo.jar"));
    assert!(prerequisites.contains("src/jar.mn"));
    assert!(prerequisites.contains("src/a.js"));
}

#[test]
fn test_make_jar_from_reader() {
    let fx = Fixture::new();
    fx.write("src/a.js", "a");

    let mut maker = JarMaker::new(fx.options(OutputFormat::Flat)).unwrap();
    let stats = maker
        .make_jar("[app] foo.jar:\n  content/a.js\n".as_bytes(), &fx.path("out"))
        .unwrap();

    assert_eq!(stats.copied, 1);
    assert_eq!(fx.read("out/app/foo/content/a.js"), "a");
}

#[test]
fn test_manifest_directory_is_searched_first() {
    let fx = Fixture::new();
    fx.write("src/a.js", "from src");
    fx.write("manifests/a.js", "next to manifest");
    let manifest = fx.write("manifests/jar.mn", "[app] foo.jar:\n  content/a.js\n");

    let mut maker = JarMaker::new(fx.options(OutputFormat::Flat)).unwrap();
    maker.make_jar_from_path(&manifest, &fx.path("out")).unwrap();

    assert_eq!(fx.read("out/app/foo/content/a.js"), "next to manifest");
}

#[test]
fn test_sources_near_the_epoch_are_packaged() {
    let fx = Fixture::new();
    let source = fx.write("src/a.js", "a");
    filetime::set_file_mtime(&source, FileTime::from_unix_time(1, 0)).unwrap();
    let manifest = "[app] foo.jar:\n  content/a.js\n";

    for format in [OutputFormat::Jar, OutputFormat::Flat] {
        let first = fx.run(fx.options(format), manifest).unwrap();
        assert_eq!(first.copied, 1, "{}", format);
        assert_eq!(first.up_to_date, 0, "{}", format);

        let second = fx.run(fx.options(format), manifest).unwrap();
        assert_eq!(second.writes(), 0, "{}", format);
    }
    assert_eq!(
        jar_entries(&fx.path("out/app/foo.jar")),
        vec![("content/a.js".to_string(), b"a".to_vec())]
    );
    assert_eq!(fx.read("out/app/foo/content/a.js"), "a");
}

#[test]
fn test_corrupt_jar_is_rebuilt() {
    let fx = Fixture::new();
    fx.write("src/a.js", "a");
    fx.write("out/app/foo.jar", "PK\u{3}\u{4}truncated");

    let stats = fx
        .run(fx.options(OutputFormat::Jar), "[app] foo.jar:\n  content/a.js\n")
        .unwrap();

    assert_eq!(stats.copied, 1);
    assert_eq!(
        jar_entries(&fx.path("out/app/foo.jar")),
        vec![("content/a.js".to_string(), b"a".to_vec())]
    );
}
