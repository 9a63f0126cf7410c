use std::collections::HashMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use petal_curator::app::App;
use petal_curator::config::ResolvedConfig;
use petal_curator::domain::{Doi, PaperRecord};
use petal_curator::error::PetalError;
use petal_curator::golden::GoldenDataset;
use petal_curator::openalex::{OpenAlexClient, OpenAlexWork};
use petal_curator::output::JsonOutput;
use petal_curator::scrape::PageFetcher;
use petal_curator::store::{LabelColumns, Store};

const FUNCTION_MAP: &str = "\
Level I,Level II,Level III,ALevel I,ALevel II,ALevel III
Attach,Attach temporarily,,Attach,Attach temporarily,
Modify color/camouflage,,,Change color,,
";

const LABELED: &str = "\
doi,url,title,label_level_1,label_level_2
10.1242/jeb.02556,https://a.example/gecko,Gecko feet,['Attach'],['Attach temporarily']
,https://b.example/octopus,Octopus skin,['Change color'],[]
,https://c.example/bird,Bird flight,['Fly'],[]
";

#[derive(Default)]
struct MockOpenAlex {
    works: HashMap<String, OpenAlexWork>,
}

impl OpenAlexClient for MockOpenAlex {
    fn work_by_doi(&self, doi: &Doi) -> Result<Option<OpenAlexWork>, PetalError> {
        Ok(self.works.get(doi.as_str()).cloned())
    }

    fn work_by_id(&self, id: &str) -> Result<Option<OpenAlexWork>, PetalError> {
        Ok(self.works.get(id).cloned())
    }
}

struct MockPages(HashMap<String, String>);

impl PageFetcher for MockPages {
    fn fetch_page(&self, url: &str) -> Result<String, PetalError> {
        self.0
            .get(url)
            .cloned()
            .ok_or_else(|| PetalError::PageStatus {
                status: 404,
                url: url.to_string(),
            })
    }
}

fn workspace() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    fs::write(root.join("function_map.csv"), FUNCTION_MAP).unwrap();
    fs::write(root.join("labeled.csv"), LABELED).unwrap();
    (temp, root)
}

fn app(root: &Utf8Path, openalex: MockOpenAlex) -> App<MockOpenAlex, MockPages> {
    App::new(
        Store::new(root.to_path_buf()),
        ResolvedConfig::default(),
        openalex,
        MockPages(HashMap::new()),
    )
}

#[test]
fn convert_holds_out_unmapped_papers() {
    let (_temp, root) = workspace();
    let app = app(&root, MockOpenAlex::default());

    let result = app
        .convert(
            Utf8Path::new("labeled.csv"),
            Utf8Path::new("function_map.csv"),
            Utf8Path::new("converted.csv"),
            &JsonOutput,
        )
        .unwrap();

    assert_eq!(result.report.total, 3);
    assert_eq!(result.report.mapped, 2);
    assert_eq!(result.report.manual, 1);
    let manual_path = result.manual_review.unwrap();
    assert!(manual_path.ends_with("papers_to_label/papers_to_label_0.csv"));

    let mapped = Store::read_records(&root.join("converted.csv"), LabelColumns::Petal).unwrap();
    assert_eq!(mapped.len(), 2);
    assert_eq!(mapped[0].level1, vec!["attach"]);
    assert_eq!(mapped[0].level2, vec!["attach_temporarily"]);
    assert_eq!(mapped[0].ask_level1, vec!["attach"]);
    assert_eq!(mapped[1].level1, vec!["modify_color/camouflage"]);

    let held_out =
        Store::read_records(Utf8Path::new(&manual_path), LabelColumns::Petal).unwrap();
    assert_eq!(held_out.len(), 1);
    assert_eq!(held_out[0].title, "Bird flight");
    assert_eq!(held_out[0].ask_level1, vec!["fly"]);
}

#[test]
fn missing_function_map_column_is_fatal() {
    let (_temp, root) = workspace();
    fs::write(root.join("bad_map.csv"), "Level I,ALevel I\nAttach,Attach\n").unwrap();
    let app = app(&root, MockOpenAlex::default());

    let err = app
        .convert(
            Utf8Path::new("labeled.csv"),
            Utf8Path::new("bad_map.csv"),
            Utf8Path::new("converted.csv"),
            &JsonOutput,
        )
        .unwrap_err();

    assert!(matches!(err, PetalError::FunctionMapColumn(_)));
    assert!(!root.join("converted.csv").as_std_path().exists());
}

#[test]
fn full_run_grows_golden_dataset() {
    let (_temp, root) = workspace();
    let golden = GoldenDataset::new(vec![PaperRecord {
        petal_id: Some(7),
        url: "https://existing.example".to_string(),
        level1: vec!["attach".to_string()],
        ..Default::default()
    }]);
    golden.save(&root.join("golden.json")).unwrap();

    let openalex = MockOpenAlex {
        works: HashMap::from([(
            "10.1242/JEB.02556".to_string(),
            OpenAlexWork {
                id: "https://openalex.org/W9".to_string(),
                title: "Evidence for van der Waals adhesion in gecko setae".to_string(),
                ..OpenAlexWork::default()
            },
        )]),
    };
    let app = app(&root, openalex);

    let result = app
        .run(
            Utf8Path::new("labeled.csv"),
            Utf8Path::new("function_map.csv"),
            Utf8Path::new("golden.json"),
            &JsonOutput,
        )
        .unwrap();

    assert_eq!(result.conversion.manual, 1);
    assert_eq!(result.enrichment.enriched, 1);
    assert_eq!(result.enrichment.skipped, 1);
    assert_eq!(result.merge.appended, 2);
    assert!(result.validation.success);

    let saved = GoldenDataset::load(&root.join("golden.json")).unwrap();
    let ids: Vec<_> = saved.records().iter().map(|r| r.petal_id).collect();
    assert_eq!(ids, vec![Some(7), Some(8), Some(9)]);
    assert_eq!(
        saved.find(8).unwrap().title,
        "Evidence for van der Waals adhesion in gecko setae"
    );
    assert_eq!(saved.find(8).unwrap().paper, "W9");
}

#[test]
fn running_the_same_batch_twice_keeps_golden_size() {
    let (_temp, root) = workspace();
    let app = app(&root, MockOpenAlex::default());
    let run = || {
        app.run(
            Utf8Path::new("labeled.csv"),
            Utf8Path::new("function_map.csv"),
            Utf8Path::new("golden.json"),
            &JsonOutput,
        )
        .unwrap()
    };

    let first = run();
    assert_eq!(first.merge.appended, 2);
    let after_first = GoldenDataset::load(&root.join("golden.json")).unwrap();

    let second = run();
    assert_eq!(second.merge.appended, 0);
    assert_eq!(second.conversion.mapped, 2);
    assert_eq!(second.conversion.manual, 1);
    let after_second = GoldenDataset::load(&root.join("golden.json")).unwrap();
    assert_eq!(after_second.len(), after_first.len());
    assert_eq!(after_second.len(), 2);

    let batch = Store::read_records(&root.join("labeled.csv"), LabelColumns::AskNature).unwrap();
    let ids: Vec<_> = batch.iter().map(|record| record.petal_id).collect();
    assert_eq!(ids, vec![Some(1), Some(2), None]);
}

#[test]
fn harvest_then_scrape_fills_missing_dois() {
    let (_temp, root) = workspace();
    fs::write(
        root.join("hits.json"),
        r#"[{
            "taxonomies_hierarchical": {"function": {"lvl0": ["Attach"]}},
            "reference_sources": {"source_link": ["https://journal.example/paper"]}
        }]"#,
    )
    .unwrap();
    let pages = MockPages(HashMap::from([(
        "https://journal.example/paper".to_string(),
        r#"<html><a href="https://doi.org/10.1038/nature01234">Full text</a></html>"#.to_string(),
    )]));
    let app = App::new(
        Store::new(root.clone()),
        ResolvedConfig::default(),
        MockOpenAlex::default(),
        pages,
    );

    let harvested = app
        .harvest(Utf8Path::new("hits.json"), Utf8Path::new("harvested.csv"), &JsonOutput)
        .unwrap();
    assert_eq!(harvested.records, 1);

    let scraped = app
        .scrape_dois(
            Utf8Path::new("harvested.csv"),
            Utf8Path::new("scraped.csv"),
            &JsonOutput,
        )
        .unwrap();
    assert_eq!(scraped.report.found, 1);

    let records =
        Store::read_records(&root.join("scraped.csv"), LabelColumns::AskNature).unwrap();
    assert_eq!(records[0].doi, "10.1038/NATURE01234");
    assert_eq!(records[0].ask_level1, vec!["attach"]);
}

#[test]
fn validate_reports_unreadable_golden() {
    let (_temp, root) = workspace();
    let app = app(&root, MockOpenAlex::default());
    let err = app
        .validate(Utf8Path::new("missing.json"), &JsonOutput)
        .unwrap_err();
    assert!(matches!(err, PetalError::InputRead { .. }));
}
