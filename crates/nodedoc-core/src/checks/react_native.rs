//! React Native project checks

use serde::Serialize;

use super::{spec_major, Project};
use crate::report::{Finding, IntoReport, Report, Section, Status};
use crate::versions::Range;

const METRO_CONFIGS: [&str; 4] = [
    "metro.config.js",
    "metro.config.cjs",
    "metro.config.mjs",
    "metro.config.json",
];

const GRADLE_FILES: [&str; 2] = ["android/build.gradle", "android/build.gradle.kts"];

/// Packages with native code that need pods / gradle sync after install
pub const KNOWN_NATIVE_MODULES: [&str; 9] = [
    "react-native-vector-icons",
    "react-native-gesture-handler",
    "react-native-reanimated",
    "react-native-screens",
    "react-native-safe-area-context",
    "@react-native-async-storage/async-storage",
    "react-native-svg",
    "react-native-camera",
    "react-native-maps",
];

/// `(major, minor)` of the lowest version a spec admits
fn release_of(spec: &str) -> Option<(u64, u64)> {
    let min = Range::parse(spec).ok()?.min_version()?;
    Some((min.major, min.minor))
}

/// React / React Native pairing problems
pub fn check_react_compatibility(react_native: &str, react: Option<&str>) -> Vec<Finding> {
    let Some(react) = react else {
        return vec![Finding::fail("React not found in dependencies")];
    };
    let (Some(rn), Some(react_major)) = (release_of(react_native), spec_major(react)) else {
        return vec![Finding::skip(format!(
            "Cannot compare react-native {} with react {}",
            react_native, react
        ))];
    };

    let mut issues = Vec::new();
    if rn >= (0, 70) && react_major < 18 {
        issues.push(Finding::fail(format!(
            "React Native {} requires React 18+, found {}",
            react_native, react
        )));
    }
    if rn.0 == 0 && (68..70).contains(&rn.1) && react_major > 18 {
        issues.push(Finding::warn(format!(
            "React Native {} may not support React {}",
            react_native, react
        )));
    }
    issues
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformSetup {
    /// `None` when the platform directory does not exist
    pub ok: Option<bool>,
    pub message: String,
}

impl PlatformSetup {
    fn finding(&self) -> Finding {
        let status = match self.ok {
            None => Status::Info,
            Some(true) => Status::Pass,
            Some(false) => Status::Fail,
        };
        Finding::new(status, self.message.clone())
    }
}

pub fn check_ios(project: &Project) -> PlatformSetup {
    let (ok, message) = if !project.has_dir("ios") {
        (None, "No ios directory")
    } else if !project.has_file("ios/Podfile") {
        (Some(false), "No Podfile found")
    } else if !project.has_dir("ios/Pods") {
        (Some(false), "Pods not installed - run: cd ios && pod install")
    } else {
        (Some(true), "Pods installed")
    };
    PlatformSetup {
        ok,
        message: message.to_string(),
    }
}

pub fn check_android(project: &Project) -> PlatformSetup {
    let (ok, message) = if !project.has_dir("android") {
        (None, "No android directory".to_string())
    } else {
        match GRADLE_FILES.iter().find(|f| project.has_file(f)) {
            Some(file) => (Some(true), format!("Gradle configured ({})", file)),
            None => (Some(false), "No build.gradle found".to_string()),
        }
    };
    PlatformSetup { ok, message }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReactNativeReport {
    /// Declared react-native spec; `None` when not a React Native project
    pub react_native: Option<String>,
    pub react: Option<String>,
    pub expo: bool,
    pub compatibility: Vec<Finding>,
    pub metro_config: Option<String>,
    pub native_modules: Vec<(String, String)>,
    pub ios: PlatformSetup,
    pub android: PlatformSetup,
}

pub fn check_react_native(project: &Project) -> ReactNativeReport {
    let manifest = &project.manifest;
    let react_native = manifest.dependency_spec("react-native").map(str::to_string);
    let react = manifest.dependency_spec("react").map(str::to_string);

    let compatibility = react_native
        .as_deref()
        .map(|rn| check_react_compatibility(rn, react.as_deref()))
        .unwrap_or_default();
    let native_modules = KNOWN_NATIVE_MODULES
        .iter()
        .filter_map(|name| {
            manifest
                .dependency_spec(name)
                .map(|spec| (name.to_string(), spec.to_string()))
        })
        .collect();

    ReactNativeReport {
        react_native,
        react,
        expo: project.is_expo(),
        compatibility,
        metro_config: METRO_CONFIGS
            .iter()
            .find(|f| project.has_file(f))
            .map(|f| f.to_string()),
        native_modules,
        ios: check_ios(project),
        android: check_android(project),
    }
}

impl IntoReport for ReactNativeReport {
    fn to_report(&self) -> Report {
        let report = Report::new("React Native Doctor");
        let Some(rn) = &self.react_native else {
            return report.section(
                Section::new("Project").with(Finding::fail("Not a React Native project")),
            );
        };

        let mut project = Section::new("Project");
        project.push(Finding::pass(format!("React Native project detected: {}", rn)));
        if self.expo {
            project.push(Finding::info("Expo project").detail("Prefer `npx expo-doctor` for Expo-managed dependencies"));
        }

        let mut react = Section::new("[1/5] Checking React compatibility...");
        if self.compatibility.is_empty() {
            react.push(Finding::pass(format!(
                "React {} compatible with RN {}",
                self.react.as_deref().unwrap_or("?"),
                rn
            )));
        }
        for finding in &self.compatibility {
            react.push(finding.clone());
        }

        let metro = Section::new("[2/5] Checking Metro bundler...").with(match &self.metro_config {
            Some(file) => Finding::pass(format!("Metro config found: {}", file)),
            None => Finding::warn("No metro.config.js found")
                .detail("May use default configuration"),
        });

        let mut native = Section::new("[3/5] Checking native dependencies...");
        if self.native_modules.is_empty() {
            native.push(Finding::pass("No common native dependencies detected"));
        } else {
            native.push(
                Finding::info(format!("Found {} native module(s)", self.native_modules.len()))
                    .details(
                        self.native_modules
                            .iter()
                            .map(|(name, spec)| format!("• {}: {}", name, spec)),
                    ),
            );
            native.push(
                Finding::warn("Native modules require linking")
                    .detail("Auto-linking should handle this automatically"),
            );
        }

        report
            .section(project)
            .section(react)
            .section(metro)
            .section(native)
            .section(Section::new("[4/5] Checking iOS setup...").with(self.ios.finding()))
            .section(Section::new("[5/5] Checking Android setup...").with(self.android.finding()))
            .recommend_all([
                "iOS native dependencies: cd ios && pod install",
                "Android native dependencies: cd android && ./gradlew clean",
                "Clear Metro cache: npx react-native start --reset-cache",
                "Rebuild: npx react-native run-ios / run-android",
                "Check autolinking: npx react-native config",
                "For Expo projects, run: npx expo-doctor",
            ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::fixtures::write;
    use tempfile::tempdir;

    #[test]
    fn test_react_compatibility() {
        assert!(check_react_compatibility("0.73.4", Some("18.2.0")).is_empty());

        let old_react = check_react_compatibility("^0.72.0", Some("^17.0.2"));
        assert_eq!(old_react.len(), 1);
        assert_eq!(old_react[0].status, Status::Fail);

        let new_react = check_react_compatibility("0.69.12", Some("^19.0.0"));
        assert_eq!(new_react[0].status, Status::Warn);

        assert!(check_react_compatibility("0.68.0", Some("17.0.2")).is_empty());

        let missing = check_react_compatibility("0.73.0", None);
        assert_eq!(missing[0].message, "React not found in dependencies");
    }

    #[test]
    fn test_check_react_native_project() {
        let temp = tempdir().unwrap();
        write(
            temp.path(),
            "package.json",
            r#"{"dependencies":{"react":"18.2.0","react-native":"0.74.1","react-native-svg":"15.2.0"}}"#,
        );
        write(temp.path(), "metro.config.js", "module.exports = {};");
        write(temp.path(), "ios/Podfile", "platform :ios, '13.4'");
        write(temp.path(), "android/build.gradle.kts", "");

        let project = Project::load(temp.path()).unwrap();
        let result = check_react_native(&project);
        assert!(result.compatibility.is_empty());
        assert_eq!(result.metro_config.as_deref(), Some("metro.config.js"));
        assert_eq!(
            result.native_modules,
            [("react-native-svg".to_string(), "15.2.0".to_string())]
        );
        assert_eq!(result.ios.ok, Some(false));
        assert!(result.ios.message.contains("pod install"));
        assert_eq!(result.android.ok, Some(true));

        let text = result.to_report().to_string();
        assert!(text.contains("React Native project detected: 0.74.1"));
        assert!(text.contains("• react-native-svg: 15.2.0"));
    }

    #[test]
    fn test_not_react_native() {
        let temp = tempdir().unwrap();
        write(temp.path(), "package.json", r#"{"dependencies":{"react":"18.2.0"}}"#);
        let project = Project::load(temp.path()).unwrap();
        let result = check_react_native(&project);
        assert!(result.react_native.is_none());
        assert_eq!(result.ios.ok, None);
        assert!(result.to_report().has_failures());
    }
}
