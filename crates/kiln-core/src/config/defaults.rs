//! Default configuration values

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "kiln.toml";

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "kiln.yaml";

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_TOML,
        DEFAULT_CONFIG_YAML,
        ".kiln.toml",
        ".kiln.yaml",
    ]
}

/// Directory (relative to the project root) holding kiln state
pub const STATE_DIR: &str = ".kiln";

/// Default configuration template (TOML)
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# kiln configuration

[settings]
# workers = 4          # default: half the available CPUs, minimum 1
mode = "halt"          # or "best-effort"
rebuild_dependents = true

[settings.cache]
enabled = true
dir = ".kiln/fingerprints"

[[tasks]]
name = "compile"
description = "Compiles main sources"
group = "build"
command = "javac -encoding UTF-8 -d build/classes $(find src/main/java -name '*.java')"
inputs = [{ dir = "src/main/java" }, { value = { key = "encoding", value = "UTF-8" } }]
outputs = ["build/classes"]

[[tasks]]
name = "delombok"
description = "Generates delomboked sources"
group = "build"
command = "java -jar lombok.jar delombok src/main/java -d build/delombok"
depends_on = ["compile"]
inputs = [{ dir = "src/main/java" }]
outputs = ["build/delombok"]
clean_outputs = true

[[tasks]]
name = "javadoc"
description = "Generates API documentation from delomboked sources"
group = "documentation"
command = "javadoc -encoding UTF-8 -d build/docs/javadoc -sourcepath build/delombok -subpackages ."
depends_on = ["delombok"]
inputs = [{ dir = "build/delombok" }]
outputs = ["build/docs/javadoc"]

[[tasks]]
name = "test"
description = "Runs the unit tests"
group = "verification"
command = "java -jar junit-platform-console-standalone.jar -cp build/classes --scan-classpath"
depends_on = ["compile"]
always_run = true
ignore_failures = true

[[tasks]]
name = "coverage"
description = "Generates the coverage report"
group = "verification"
command = "java -jar jacococli.jar report build/jacoco/test.exec --classfiles build/classes --html build/reports/jacoco"
depends_on = ["test"]
outputs = ["build/reports/jacoco"]

[[tasks]]
name = "check"
description = "Runs all verification tasks"
group = "verification"
depends_on = ["test", "coverage"]
"#;

/// Default configuration template (YAML)
pub const DEFAULT_CONFIG_YAML_TEMPLATE: &str = r#"# kiln configuration

settings:
  mode: halt
  rebuild_dependents: true
  cache:
    enabled: true
    dir: .kiln/fingerprints

tasks:
  - name: compile
    description: Compiles main sources
    group: build
    command: "javac -encoding UTF-8 -d build/classes $(find src/main/java -name '*.java')"
    inputs:
      - dir: src/main/java
      - value: { key: encoding, value: UTF-8 }
    outputs: [build/classes]

  - name: javadoc
    description: Generates API documentation
    group: documentation
    command: "javadoc -encoding UTF-8 -d build/docs/javadoc -sourcepath src/main/java -subpackages ."
    depends_on: [compile]
    inputs:
      - dir: src/main/java
    outputs: [build/docs/javadoc]

  - name: test
    description: Runs the unit tests
    group: verification
    command: "java -jar junit-platform-console-standalone.jar -cp build/classes --scan-classpath"
    depends_on: [compile]
    always_run: true
"#;
