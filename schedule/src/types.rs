use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Faculty {
    pub id: u32,
    pub short_name: String,
    pub full_name: String,
}

/// Year of study within a faculty. Only used as a filter key for groups.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Course {
    pub course: u32,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Group {
    pub id: u32,
    pub name: String,
    pub course: u32,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: u32,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub second_name: Option<String>,
}

impl Student {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.last_name, self.first_name)
    }
}

/// One scheduled class occurrence.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LessonPeriod {
    pub discipline_full_name: String,
    pub discipline_short_name: String,
    pub classroom: String,
    pub time_start: String,
    pub time_end: String,
    pub teachers_name: String,
    #[serde(default)]
    pub teachers_name_full: Option<String>,
    pub type_str: String,
    // Upstream markup, shown as-is
    #[serde(default)]
    pub notice: Option<String>,
}

/// A numbered slot in a day. Parallel sections share a slot.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct LessonSlot {
    pub number: u32,
    pub periods: Vec<LessonPeriod>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct TimetableDay {
    pub date: String,
    pub lessons: Vec<LessonSlot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_timetable() {
        let json = r#"[{
            "date": "2025-01-06",
            "lessons": [{
                "number": 2,
                "periods": [{
                    "disciplineFullName": "Вища математика",
                    "disciplineShortName": "ВМ",
                    "classroom": "301",
                    "timeStart": "09:50",
                    "timeEnd": "11:10",
                    "teachersName": "Іваненко І.І.",
                    "typeStr": "Лк",
                    "notice": null
                }]
            }]
        }]"#;

        let days: Vec<TimetableDay> = serde_json::from_str(json).unwrap();
        let period = &days[0].lessons[0].periods[0];
        assert_eq!(days[0].lessons[0].number, 2);
        assert_eq!(period.discipline_short_name, "ВМ");
        assert_eq!(period.teachers_name_full, None);
        assert_eq!(period.notice, None);
    }

    #[test]
    fn test_student_display_name() {
        let student: Student = serde_json::from_str(
            r#"{"id": 5, "firstName": "Олена", "lastName": "Коваль", "secondName": "Петрівна"}"#,
        )
        .unwrap();
        assert_eq!(student.display_name(), "Коваль Олена");

        let student: Student =
            serde_json::from_str(r#"{"id": 6, "firstName": "Ігор", "lastName": "Бондар"}"#)
                .unwrap();
        assert_eq!(student.second_name, None);
    }
}
