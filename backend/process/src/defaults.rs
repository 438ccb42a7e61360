//! Built-in college reference data, used when no roster has been loaded.
//!
//! Course and category rows point at departments by position in
//! [`departments`], which matches their ids in an empty table.
use ledger::records::{NewCategory, NewCourse, NewDepartment, Priority};

pub fn departments() -> Vec<NewDepartment> {
    [
        ("Computer Science & Engineering", "CSE", "Software development and computer systems", "Dr. Rajesh Kumar", "cse.head@college.edu", "+91-9876543210", "Block A - 3rd Floor"),
        ("Electronics & Communication", "ECE", "Electronics and communication systems", "Dr. Priya Sharma", "ece.head@college.edu", "+91-9876543211", "Block B - 2nd Floor"),
        ("Mechanical Engineering", "MECH", "Mechanical systems and manufacturing", "Dr. Amit Singh", "mech.head@college.edu", "+91-9876543212", "Block C - 1st Floor"),
        ("Civil Engineering", "CIVIL", "Construction and infrastructure", "Dr. Sunita Verma", "civil.head@college.edu", "+91-9876543213", "Block D - Ground Floor"),
        ("Electrical Engineering", "EEE", "Electrical systems and power", "Dr. Vikram Gupta", "eee.head@college.edu", "+91-9876543214", "Block E - 2nd Floor"),
        ("Information Technology", "IT", "Information systems and networks", "Dr. Neha Agarwal", "it.head@college.edu", "+91-9876543215", "Block A - 2nd Floor"),
        ("Hostel Management", "HOSTEL", "Student accommodation services", "Mr. Ravi Patel", "hostel.warden@college.edu", "+91-9876543216", "Hostel Block"),
        ("Mess & Catering", "MESS", "Food and dining services", "Mrs. Kavita Joshi", "mess.manager@college.edu", "+91-9876543217", "Mess Building"),
    ]
    .into_iter()
    .map(|(name, code, description, head_name, email, phone, location)| NewDepartment {
        name: name.into(),
        code: code.into(),
        description: Some(description.into()),
        head_name: Some(head_name.into()),
        email: Some(email.into()),
        phone: Some(phone.into()),
        location: Some(location.into()),
    })
    .collect()
}

pub fn courses() -> Vec<NewCourse> {
    [
        ("Bachelor of Technology in Computer Science", "B.Tech CSE", 4, 1, "Undergraduate"),
        ("Bachelor of Technology in Electronics & Communication", "B.Tech ECE", 4, 2, "Undergraduate"),
        ("Bachelor of Technology in Mechanical Engineering", "B.Tech MECH", 4, 3, "Undergraduate"),
        ("Bachelor of Technology in Civil Engineering", "B.Tech CIVIL", 4, 4, "Undergraduate"),
        ("Bachelor of Technology in Electrical Engineering", "B.Tech EEE", 4, 5, "Undergraduate"),
        ("Bachelor of Technology in Information Technology", "B.Tech IT", 4, 6, "Undergraduate"),
        ("Master of Technology in Computer Science", "M.Tech CSE", 2, 1, "Postgraduate"),
        ("Bachelor of Computer Applications", "BCA", 3, 6, "Undergraduate"),
    ]
    .into_iter()
    .map(|(name, code, duration_years, department_id, degree_type)| NewCourse {
        name: name.into(),
        code: code.into(),
        duration_years,
        department_id,
        degree_type: degree_type.into(),
    })
    .collect()
}

pub fn categories() -> Vec<NewCategory> {
    use Priority::{High, Medium};

    [
        ("Academic Issues", "Course content and teaching related complaints", 1, Medium, 7),
        ("Lab Equipment", "Computer lab and equipment issues", 1, High, 3),
        ("Hostel Accommodation", "Room allocation and hostel facilities", 7, High, 5),
        ("Mess Food Quality", "Food quality and dining services", 8, Medium, 2),
        ("Network & WiFi", "Internet connectivity and network issues", 6, High, 2),
        ("Infrastructure", "Building maintenance and facility issues", 4, Medium, 10),
        ("Examination Issues", "Exam scheduling and evaluation concerns", 1, High, 10),
        ("Fee & Payment", "Fee structure and payment related issues", 1, Medium, 7),
    ]
    .into_iter()
    .map(|(name, description, department_id, priority_level, typical_resolution_days)| NewCategory {
        name: name.into(),
        description: Some(description.into()),
        department_id,
        priority_level,
        typical_resolution_days,
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn references_stay_within_departments() {
        let count = departments().len() as i64;

        assert!(courses().iter().all(|c| (1..=count).contains(&c.department_id)));
        assert!(categories().iter().all(|c| (1..=count).contains(&c.department_id)));
    }

    #[test]
    fn codes_are_unique() {
        let codes: HashSet<_> = departments().into_iter().map(|d| d.code).collect();
        assert_eq!(codes.len(), 8);

        let courses: HashSet<_> = courses().into_iter().map(|c| c.code).collect();
        assert_eq!(courses.len(), 8);
    }
}
