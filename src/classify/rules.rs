//! Keyword rules and the built-in BRIMR vocabulary

use serde::{Deserialize, Serialize};

use super::{normalize_keyword, Category, LabelForms};
use crate::error::DownloaderError;

/// Which form of the label a rule's keywords are matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchForm {
    /// Lower-cased label as is (separators kept, e.g. `_pi_`).
    Raw,
    /// Lower-cased label without `-`, `_` and whitespace.
    Normalized,
    /// Whole word of the lower-cased label, split on whitespace, `_`, `-` and `.`.
    Word,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub category: Category,
    pub form: MatchForm,
    pub keywords: Vec<String>,
}

impl Rule {
    pub fn new(category: Category, form: MatchForm, keywords: &[&str]) -> Self {
        Self {
            category,
            form,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    pub(crate) fn matches(&self, label: &LabelForms) -> bool {
        let haystack = match self.form {
            MatchForm::Raw => &label.raw,
            MatchForm::Normalized => &label.normalized,
            MatchForm::Word => return self.keywords.iter().any(|k| label.words.contains(k)),
        };
        self.keywords.iter().any(|k| haystack.contains(k.as_str()))
    }

    /// Lower-case (and for normalized rules, strip separators from) every keyword.
    pub(crate) fn canonical(mut self) -> Result<Self, DownloaderError> {
        self.keywords = self
            .keywords
            .iter()
            .map(|k| match self.form {
                MatchForm::Raw | MatchForm::Word => k.to_lowercase(),
                MatchForm::Normalized => normalize_keyword(k),
            })
            .filter(|k| !k.is_empty())
            .collect();

        if self.keywords.is_empty() {
            return Err(DownloaderError::Rules(format!(
                "rule for {} has no keywords",
                self.category
            )));
        }
        Ok(self)
    }
}

/// PI files usually also name a department, so their markers are checked first.
const PI_RAW_MARKERS: &[&str] = &["_pi_", "_pi.", "pi_2", "contractspi", "investigator"];
const PI_WORDS: &[&str] = &["pi"];
/// Too short to match inside other words ("department", "dentistry").
const CLINICAL_WORDS: &[&str] = &["ent"];
const PI_NORMALIZED_MARKERS: &[&str] = &[
    "allorgdeptpi",
    "deptschoolpi",
    "schooldeptpi",
    "principalinvestigator",
];

const SOURCE_DATA: &[&str] = &[
    "worldwide", "worldwidebrimr", "brimrworldwide",
    "allorgs", "medicalschoolsonly", "medicalschools",
    "contracts", "somcontracts", "worldwidecontractsonly",
];

const SCHOOL_RANKINGS: &[&str] = &[
    "schoolofmedicine",
    "schoolofdentistry", "dentistry",
    "schoolofnursing", "nursing",
    "schoolofpublichealth",
    "schoolofpharmacy", "pharmacy",
    "schoolofveterinarymedicine", "schoolofverterinarymedicine",
    "schoolsofveterinarymedicine", "veterinarymedicine",
    "schoolofosteopathicmedicine",
    "schoolofalliedhealth",
    "hospitals",
    "otherhealthprofessions",
];

const DEPARTMENT_SUMMARIES: &[&str] = &[
    "bydepartment", "bydepartmentr",
    "awardsbydepartment",
    "medicalschoolsandtheirdepartments",
    "medicalschoolsanddept", "medicalschoolanddept",
    "mastertemplatenihawards", "mastertemplatenihawardsr",
];

const BASIC_SCIENCE: &[&str] = &[
    "anatomycellbiol", "anatomycellbiology", "anatomycellbiologyr",
    "biochemistry", "biochemistryr",
    "biomedicalengineering",
    "genetics", "geneticsr",
    "microbiology", "microbiologyr",
    "neurosciences", "neurosciencesr",
    "pharmacology", "pharmacologyr",
    "physiology", "physiologyr",
    "otherbasicsciences",
];

const CLINICAL_DEPTS: &[&str] = &[
    "anesthesiology", "anesthesiologyr",
    "dermatology", "dermatologyr",
    "emergencymedicine", "emergencymediciner",
    "familymedicine", "familymediciner",
    "medicine", "mediciner",
    "neurology", "neurologyr", "neurologyxls",
    "neurosurgery", "neurosurgeryr",
    "nutrition",
    "obgyn", "obgynr",
    "obstetrics", "obstetricsandgynecology", "obstetricsgynecology",
    "ophthalmology", "ophthalmologyr",
    "orthopedics", "orthopedicsr",
    "otolaryngology", "otolaryngologyr",
    "pathology", "pathologyr",
    "pediatrics", "pediatricsr",
    "physicalme", "physicalmed", "physicalmedicine", "physicalmediciner",
    "psychiatry", "psychiatryr",
    "publichealth", "publichealthr",
    "radiology", "radiologyr",
    "surgery", "surgeryr",
    "urology", "urologyr",
    "otherclinicalsciences",
];

// Bare "pi" is left to the marker rules; as a substring it hits too many names.
const PI_RANKINGS: &[&str] = &[
    "allpis", "pisbyrank",
    "allorgdeptpi", "deptorgpi", "deptschoolpi", "deptschoolpir",
    "schooldeptpi",
    "contractspi",
    "anatomycellbiolpi", "anatomycellbiologypi",
    "biochemistrypi",
    "biomedicalengineeringpi",
    "geneticspi",
    "microbiologypi",
    "neurosciencespi",
    "pharmacologypi", "pharmacologypir",
    "physiologypi", "physiologypi2xls", "physiologypir",
    "anesthesiologypi",
    "dermatologypi",
    "emergencymedicinepi",
    "familymedicinepi",
    "medicinepi",
    "neurologypi",
    "neurosurgerypi", "neurosurgerypir",
    "obgynpi", "obgynpir",
    "obstetricspi", "obstetricsandgynecologypi", "obstetricsgynecologypi",
    "ophthalmologypi", "ophthalmologypir",
    "orthopedicspi", "orthopedicspir",
    "otolaryngologypi", "otolaryngologypir",
    "pathologypi", "pathologypir",
    "pediatricspi", "pediatricspir",
    "physicalmedicinepi", "physicalmedicinepir",
    "psychiatrypi", "psychiatrypir",
    "publichealthpi", "publichealthpir",
    "radiologypi", "radiologypir",
    "surgerypi", "surgerypir", "surgerypibcorrecte",
    "urologypi", "urologypir",
];

const GEOGRAPHIC: &[&str] = &[
    "state", "statesandcountries",
    "city", "allcities", "citiesbyrankr",
    "institution", "allinstitutions", "allinstitutionsr",
    "organization",
    "fundingrankbystate",
    "percapitafundingbystate", "percapitafundingrankbystate",
];

const OTHER: &[&str] = &[
    "topten", "toptenr",
    "covidawards", "covid",
    "merit", "nihmerit",
];

fn vocabulary() -> [(Category, &'static [&'static str]); 8] {
    [
        (Category::SourceData, SOURCE_DATA),
        (Category::SchoolRankings, SCHOOL_RANKINGS),
        (Category::DepartmentSummaries, DEPARTMENT_SUMMARIES),
        (Category::BasicScience, BASIC_SCIENCE),
        (Category::ClinicalDepts, CLINICAL_DEPTS),
        (Category::PiRankings, PI_RANKINGS),
        (Category::Geographic, GEOGRAPHIC),
        (Category::Other, OTHER),
    ]
}

/// Built-in rule order: PI markers, then one rule per keyword, longest keyword
/// first, then whole-word department abbreviations. Equal lengths keep
/// vocabulary order.
pub fn default_rules() -> Vec<Rule> {
    let mut rules = vec![
        Rule::new(Category::PiRankings, MatchForm::Raw, PI_RAW_MARKERS),
        Rule::new(Category::PiRankings, MatchForm::Word, PI_WORDS),
        Rule::new(Category::PiRankings, MatchForm::Normalized, PI_NORMALIZED_MARKERS),
    ];

    let mut pool: Vec<(&'static str, Category)> = Vec::new();
    for (category, keywords) in vocabulary() {
        for &keyword in keywords {
            if !pool.iter().any(|(k, _)| *k == keyword) {
                pool.push((keyword, category));
            }
        }
    }
    pool.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    rules.extend(
        pool.into_iter()
            .map(|(keyword, category)| Rule::new(category, MatchForm::Normalized, &[keyword])),
    );
    rules.push(Rule::new(Category::ClinicalDepts, MatchForm::Word, CLINICAL_WORDS));
    rules
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_start_with_pi_markers() {
        let rules = default_rules();
        assert_eq!(rules[0].category, Category::PiRankings);
        assert_eq!(rules[0].form, MatchForm::Raw);
        assert_eq!(rules[1].form, MatchForm::Word);
        assert_eq!(rules[2].form, MatchForm::Normalized);
        assert!(rules[..3].iter().all(|r| r.category == Category::PiRankings));
    }

    #[test]
    fn test_keyword_rules_sorted_longest_first() {
        let rules = default_rules();
        let lengths: Vec<usize> = rules[3..rules.len() - 1]
            .iter()
            .map(|r| r.keywords[0].len())
            .collect();
        assert!(lengths.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_every_category_has_a_rule() {
        let rules = default_rules();
        for category in Category::ALL {
            assert!(rules.iter().any(|r| r.category == category), "{}", category);
        }
    }

    #[test]
    fn test_canonical_rejects_empty_keywords() {
        let rule = Rule::new(Category::Other, MatchForm::Normalized, &["--", " "]);
        assert!(rule.canonical().is_err());
    }
}
