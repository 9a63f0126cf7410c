use petal_curator::config::OpenAlexSettings;
use petal_curator::domain::Doi;
use petal_curator::openalex::{OpenAlexClient, OpenAlexHttpClient};

#[test]
#[ignore]
fn fetch_real_work_by_doi() {
    let client = OpenAlexHttpClient::new(&OpenAlexSettings::default()).unwrap();
    let doi: Doi = "10.1038/35015073".parse().unwrap();
    let work = client
        .work_by_doi(&doi)
        .unwrap()
        .expect("work exists");

    assert!(work.id.starts_with("https://openalex.org/W"));
    assert!(!work.title.is_empty());
    assert!(!work.authorships.is_empty());
}

#[test]
#[ignore]
fn unknown_doi_is_a_miss() {
    let client = OpenAlexHttpClient::new(&OpenAlexSettings::default()).unwrap();
    let doi: Doi = "10.9999/petal-curator-missing".parse().unwrap();
    let work = client.work_by_doi(&doi).unwrap();
    assert!(work.is_none());
}
