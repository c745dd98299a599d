//! Keyword rule table for relevance classification.
//!
//! Keyword groups are explicit, versioned data: rule changes are data
//! changes, not code changes. The table is built once per run and is
//! immutable afterwards — every keyword is pre-compiled into a
//! word-boundary regex.

use regex::Regex;

/// Language a keyword is tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    En,
    Ru,
}

impl Lang {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ru => "ru",
        }
    }
}

/// Role a keyword group plays in scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupRole {
    /// Strong relevance signal; counts toward the core-weight guardrails.
    Core,
    /// Weak signal (e.g. remote/flexibility) that only counts alongside core matches.
    Conditional,
    /// Non-tech signal that can zero the score.
    Negative,
}

/// A named keyword group with a weight and language-tagged keyword lists.
#[derive(Debug, Clone)]
pub struct KeywordGroup {
    pub name: String,
    /// Human-readable reason label used in classification evidence.
    pub label: String,
    pub weight: f64,
    pub role: GroupRole,
    pub keywords: Vec<(Lang, String)>,
}

/// A single keyword pre-compiled for matching.
struct CompiledKeyword {
    group: usize,
    keyword: String,
    lang: Lang,
    regex: Regex,
}

/// One keyword hit, retained as classification evidence.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct KeywordMatch {
    pub group: String,
    pub keyword: String,
    pub lang: Lang,
    pub role: GroupRole,
    pub weight: f64,
}

/// Immutable, versioned keyword rule table.
pub struct KeywordRuleTable {
    version: String,
    groups: Vec<KeywordGroup>,
    compiled: Vec<CompiledKeyword>,
}

/// Build a case-insensitive whole-token pattern for a keyword.
///
/// `\b` anchors are applied only at alphanumeric keyword edges, so keywords
/// like `c++` or `.net` still match (a trailing `\b` after `+` would require
/// a following word character and never match at end of token).
pub fn keyword_pattern(keyword: &str) -> String {
    let escaped = regex::escape(&keyword.to_lowercase());
    let lead = keyword
        .chars()
        .next()
        .is_some_and(|c| c.is_alphanumeric());
    let trail = keyword
        .chars()
        .last()
        .is_some_and(|c| c.is_alphanumeric());
    format!(
        "(?i){}{}{}",
        if lead { r"\b" } else { "" },
        escaped,
        if trail { r"\b" } else { "" }
    )
}

/// Compile a keyword into its whole-token matcher.
pub fn keyword_regex(keyword: &str) -> Result<Regex, regex::Error> {
    Regex::new(&keyword_pattern(keyword))
}

impl KeywordRuleTable {
    /// Build a table from groups, compiling every keyword once.
    pub fn new(version: impl Into<String>, groups: Vec<KeywordGroup>) -> Result<Self, regex::Error> {
        let mut compiled = Vec::new();
        for (idx, group) in groups.iter().enumerate() {
            for (lang, keyword) in &group.keywords {
                compiled.push(CompiledKeyword {
                    group: idx,
                    keyword: keyword.clone(),
                    lang: *lang,
                    regex: keyword_regex(keyword)?,
                });
            }
        }
        Ok(Self {
            version: version.into(),
            groups,
            compiled,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn groups(&self) -> &[KeywordGroup] {
        &self.groups
    }

    /// Reason label for a group name, if the group exists.
    pub fn label_for(&self, group_name: &str) -> Option<&str> {
        self.groups
            .iter()
            .find(|g| g.name == group_name)
            .map(|g| g.label.as_str())
    }

    /// Scan text against every keyword, in table order.
    ///
    /// A keyword listed in several groups is counted once — the first group
    /// in table order claims it. This keeps scoring deterministic when
    /// group vocabularies overlap (e.g. "python" under both tech and
    /// automation).
    pub fn match_text(&self, text: &str) -> Vec<KeywordMatch> {
        let mut seen: Vec<&str> = Vec::new();
        let mut matches = Vec::new();
        for ck in &self.compiled {
            if seen.iter().any(|k| k.eq_ignore_ascii_case(&ck.keyword)) {
                continue;
            }
            if ck.regex.is_match(text) {
                seen.push(&ck.keyword);
                let group = &self.groups[ck.group];
                matches.push(KeywordMatch {
                    group: group.name.clone(),
                    keyword: ck.keyword.clone(),
                    lang: ck.lang,
                    role: group.role,
                    weight: group.weight,
                });
            }
        }
        matches
    }

    /// The built-in bilingual rule table for automation/technology practice
    /// relevance.
    pub fn default_table() -> Self {
        fn group(
            name: &str,
            label: &str,
            weight: f64,
            role: GroupRole,
            en: &[&str],
            ru: &[&str],
        ) -> KeywordGroup {
            let mut keywords: Vec<(Lang, String)> =
                en.iter().map(|k| (Lang::En, (*k).to_string())).collect();
            keywords.extend(ru.iter().map(|k| (Lang::Ru, (*k).to_string())));
            KeywordGroup {
                name: name.to_string(),
                label: label.to_string(),
                weight,
                role,
                keywords,
            }
        }

        let groups = vec![
            group(
                "tech_core",
                "Software/IT development",
                1.0,
                GroupRole::Core,
                &[
                    "software", "developer", "programmer", "engineer", "coding",
                    "full stack", "full-stack", "backend", "back-end", "frontend",
                    "front-end", "web developer", "mobile developer", "api",
                    "microservice", "database", "sql", "postgresql", "mongodb",
                    "python", "java", "javascript", "typescript", "rust", "golang",
                    "c++", "c#", ".net", "php", "react", "angular", "vue", "django",
                    "flask", "node.js", "nodejs", "rest api", "graphql", "grpc",
                ],
                &["разработчик", "программист", "бэкенд", "фронтенд", "база данных"],
            ),
            group(
                "automation",
                "Automation/scripting",
                1.0,
                GroupRole::Core,
                &[
                    "automation", "automate", "automated", "script", "scripting",
                    "cron", "scheduler", "etl", "data pipeline", "workflow",
                    "orchestration", "airflow", "bot", "chatbot", "telegram bot",
                    "webhook", "api integration", "integration", "rpa",
                    "robotic process automation", "batch processing",
                ],
                &["автоматизация", "скрипт", "бот", "интеграция"],
            ),
            group(
                "devops",
                "DevOps/cloud",
                1.0,
                GroupRole::Core,
                &[
                    "devops", "sre", "site reliability engineer", "ci/cd", "cicd",
                    "docker", "container", "kubernetes", "k8s", "helm", "terraform",
                    "ansible", "aws", "amazon web services", "gcp", "google cloud",
                    "azure", "serverless", "linux", "server", "infrastructure",
                    "deployment", "monitoring", "prometheus", "grafana", "nginx",
                ],
                &["девопс", "сервер", "инфраструктура", "облако"],
            ),
            group(
                "ai_ml",
                "AI/ML",
                1.0,
                GroupRole::Core,
                &[
                    "ai", "artificial intelligence", "machine learning", "ml",
                    "llm", "large language model", "gpt", "chatgpt", "openai",
                    "prompt engineering", "nlp", "natural language processing",
                    "computer vision", "data science", "data scientist", "pandas",
                    "pytorch", "tensorflow", "neural network", "deep learning",
                    "recommendation system", "generative ai",
                ],
                &["нейросеть", "машинное обучение", "искусственный интеллект"],
            ),
            group(
                "security",
                "Security",
                1.0,
                GroupRole::Core,
                &[
                    "security", "cybersecurity", "infosec", "pentest",
                    "penetration testing", "ethical hacking", "soc analyst",
                    "siem", "vulnerability", "security audit", "owasp", "malware",
                    "phishing", "incident response", "forensics",
                    "application security", "sql injection", "xss", "encryption",
                    "cryptography", "firewall",
                ],
                &["информационная безопасность", "пентест", "уязвимость"],
            ),
            group(
                "it_support",
                "IT support",
                0.7,
                GroupRole::Core,
                &[
                    "it support", "technical support", "helpdesk", "help desk",
                    "service desk", "sysadmin", "system administrator",
                    "network engineer", "active directory", "dns", "vpn",
                    "troubleshooting", "windows server", "office 365", "vmware",
                    "virtualization", "hypervisor",
                ],
                &["техподдержка", "системный администратор", "сисадмин"],
            ),
            group(
                "remote_flex",
                "Remote work",
                0.2,
                GroupRole::Conditional,
                &[
                    "remote", "remote work", "work from home", "wfh",
                    "telecommute", "freelance", "freelancer", "contract",
                    "contractor", "consultant", "hybrid", "flexible schedule",
                    "digital nomad", "work from anywhere", "distributed team",
                ],
                &["удаленно", "удалённо", "удаленная работа", "фриланс", "гибкий график"],
            ),
            group(
                "non_tech",
                "Non-technical role",
                -1.0,
                GroupRole::Negative,
                &[
                    "cashier", "waiter", "waitress", "bartender", "barista",
                    "restaurant", "restaurant server", "food server", "fast food",
                    "delivery driver", "driver", "truck driver", "courier",
                    "warehouse", "construction", "laborer", "carpenter",
                    "electrician", "plumber", "cleaner", "janitor",
                    "security guard", "receptionist", "call center",
                    "telemarketer", "teacher", "tutor", "nurse", "caregiver",
                    "retail", "sales associate", "real estate agent",
                    "data entry", "hotel", "hospitality", "factory",
                    "assembly line", "manual labor",
                ],
                &[
                    "официант", "водитель", "курьер", "грузчик", "продавец",
                    "уборщица", "охранник", "кассир", "няня",
                ],
            ),
        ];

        // Static data — the escaped patterns always compile.
        Self::new("2025.08", groups).expect("default rule table compiles")
    }
}
