use std::collections::HashMap;

use crate::normalizer::CityNormalizer;
use crate::types::{EmployeeProfile, MarkerEmployee};

/// Employees grouped under one canonical city, ready for geocoding.
#[derive(Debug, Clone, PartialEq)]
pub struct CityGroup {
    pub city: String,
    pub employees: Vec<MarkerEmployee>,
}

/// Groups employees by canonical city for the map view.
///
/// Cities are normalized first; employees without a resolvable city are
/// dropped. Groups keep the order in which their city was first seen, and
/// each group is sorted by employee name ascending (stable, so employees
/// sharing a name keep their insertion order).
pub fn group_by_city(employees: Vec<EmployeeProfile>) -> Vec<CityGroup> {
    let mut groups: Vec<CityGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for employee in employees {
        let Some(city) = CityNormalizer::normalize(employee.city.as_deref()) else {
            continue;
        };

        let marker = MarkerEmployee {
            name: employee.name,
            profile_url: employee.profile_url,
            department: scrub(employee.department),
            position: scrub(employee.position),
        };

        match index.get(&city) {
            Some(&position) => groups[position].employees.push(marker),
            None => {
                index.insert(city.clone(), groups.len());
                groups.push(CityGroup {
                    city,
                    employees: vec![marker],
                });
            }
        }
    }

    for group in &mut groups {
        group.employees.sort_by(|a, b| a.name.cmp(&b.name));
    }

    groups
}

/// Drops empty values and the literal string `"None"` the legacy data
/// source used for unset fields.
fn scrub(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty() && value != "None")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: i64, name: &str, city: Option<&str>) -> EmployeeProfile {
        EmployeeProfile {
            id,
            name: name.to_string(),
            profile_url: format!("https://tasks.example.com/users/{id}"),
            city: city.map(str::to_string),
            department: None,
            position: None,
        }
    }

    #[test]
    fn city_variants_merge_into_one_group() {
        let groups = group_by_city(vec![
            profile(1, "Борис Волков", Some("Санкт Петербург")),
            profile(2, "Анна Смирнова", Some("Санкт-Петербург")),
            profile(3, "Иван Иванов", None),
        ]);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].city, "Санкт-Петербург");
        let names: Vec<_> = groups[0]
            .employees
            .iter()
            .map(|employee| employee.name.as_str())
            .collect();
        assert_eq!(names, vec!["Анна Смирнова", "Борис Волков"]);
    }

    #[test]
    fn groups_keep_first_seen_city_order() {
        let groups = group_by_city(vec![
            profile(1, "Анна Смирнова", Some("Казань")),
            profile(2, "Борис Волков", Some("Москва")),
            profile(3, "Вера Козлова", Some("Казань")),
        ]);

        let cities: Vec<_> = groups.iter().map(|group| group.city.as_str()).collect();
        assert_eq!(cities, vec!["Казань", "Москва"]);
    }

    #[test]
    fn no_two_groups_share_a_city() {
        let groups = group_by_city(vec![
            profile(1, "Анна Смирнова", Some("Пермь/Санкт-Петербург")),
            profile(2, "Борис Волков", Some("г. Петергоф, г. Санкт-Петербург")),
            profile(3, "Вера Козлова", Some("Санкт-Петербург")),
        ]);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].employees.len(), 3);
    }

    #[test]
    fn employees_without_city_are_dropped() {
        let groups = group_by_city(vec![
            profile(1, "Анна Смирнова", Some("No city")),
            profile(2, "Борис Волков", Some("Ввести город")),
            profile(3, "Вера Козлова", None),
        ]);

        assert!(groups.is_empty());
    }

    #[test]
    fn duplicate_names_keep_insertion_order() {
        let mut first = profile(1, "Иван Иванов", Some("Москва"));
        first.position = Some("Инженер".to_string());
        let mut second = profile(2, "Иван Иванов", Some("Москва"));
        second.position = Some("Аналитик".to_string());

        let groups = group_by_city(vec![first, second]);
        assert_eq!(groups[0].employees.len(), 2);
        assert_eq!(groups[0].employees[0].position.as_deref(), Some("Инженер"));
        assert_eq!(groups[0].employees[1].position.as_deref(), Some("Аналитик"));
    }

    #[test]
    fn none_literals_are_scrubbed_from_payload() {
        let mut employee = profile(1, "Анна Смирнова", Some("Москва"));
        employee.department = Some("None".to_string());
        employee.position = Some("Аналитик".to_string());

        let groups = group_by_city(vec![employee]);
        assert_eq!(groups[0].employees[0].department, None);
        assert_eq!(
            groups[0].employees[0].position.as_deref(),
            Some("Аналитик")
        );
    }
}
